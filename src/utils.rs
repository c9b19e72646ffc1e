use std::io::Read;

use hashbrown::HashMap;
use liealg::{Group, SE3, SO3};
use nalgebra::{Isometry3, Matrix3, Matrix6, Translation3, UnitQuaternion, Vector3};

use super::bfs::{parent, LinkGraph};
use super::error::{Result, SimError};
use super::spatial::to_local_spatial_inertial;
use super::{Joint, JointKind, Link};

pub(super) fn url_is_urdf_file(url: &str) -> bool {
    std::path::Path::new(url).exists() && (url.ends_with(".urdf") || url.ends_with(".URDF"))
}

pub(super) fn read_file(url: &str) -> std::io::Result<String> {
    let path = std::path::Path::new(url);
    let mut file = std::fs::File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

// link name -> link index (position in the urdf)
pub(super) fn link_indices(robot: &urdf_rs::Robot) -> HashMap<&str, usize> {
    robot
        .links
        .iter()
        .enumerate()
        .map(|(index, link)| (link.name.as_str(), index))
        .collect()
}

pub(super) fn construct_link_graph(
    robot: &urdf_rs::Robot,
    indices: &HashMap<&str, usize>,
) -> Result<LinkGraph> {
    let mut graph = LinkGraph::new();

    // nodes in declaration order
    (0..robot.links.len()).for_each(|i| {
        graph.add_node(i);
    });

    for joint in &robot.joints {
        let lookup = |name: &str| {
            indices
                .get(name)
                .copied()
                .ok_or_else(|| SimError::UnknownLink(name.to_string()))
        };
        let parent_index = lookup(&joint.parent.link)?;
        let child_index = lookup(&joint.child.link)?;
        if parent(&graph, child_index).is_some() {
            return Err(SimError::Urdf(format!(
                "link {} has more than one parent joint",
                joint.child.link
            )));
        }
        graph.add_edge(parent_index, child_index, ());
    }

    Ok(graph)
}

// movable joints are numbered in declaration order
pub(super) fn construct_links(
    robot: &urdf_rs::Robot,
    graph: &LinkGraph,
) -> Result<(Vec<Link>, usize)> {
    let mut joints = HashMap::new();
    let mut n_dof = 0;
    for joint in &robot.joints {
        let dof = match joint_kind(joint)? {
            JointKind::Fixed => None,
            _ => {
                n_dof += 1;
                Some(n_dof - 1)
            }
        };
        joints.insert(joint.child.link.as_str(), (joint, dof));
    }

    let links = robot
        .links
        .iter()
        .enumerate()
        .map(|(index, link)| {
            let (parent_zero_pose, joint) = match joints.get(link.name.as_str()) {
                Some((j, dof)) => (pose_to_isometry(&j.origin), Some(construct_joint(j, *dof)?)),
                None => (Isometry3::identity(), None),
            };
            Ok(Link {
                name: link.name.clone(),
                parent: parent(graph, index),
                parent_zero_pose,
                // use Steiner's theorem
                local_spatial_inertial: spatial_inertia(link),
                mass: link.inertial.mass.value,
                center_of_mass: Vector3::from(link.inertial.origin.xyz.0),
                joint,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((links, n_dof))
}

pub(super) fn spatial_inertia(link: &urdf_rs::Link) -> Matrix6<f64> {
    let i = &link.inertial.inertia;
    let inertia = Matrix3::new(
        i.ixx, i.ixy, i.ixz, i.ixy, i.iyy, i.iyz, i.ixz, i.iyz, i.izz,
    );
    let mass = link.inertial.mass.value;
    to_local_spatial_inertial(&pose_to_se3(&link.inertial.origin), &inertia, mass)
}

pub(super) fn pose_to_se3(pose: &urdf_rs::Pose) -> SE3<f64> {
    let rpy = pose.rpy;
    SE3::new(&SO3::from_euler_angles(rpy[0], rpy[1], rpy[2]), pose.xyz.0)
}

pub(super) fn pose_to_isometry(pose: &urdf_rs::Pose) -> Isometry3<f64> {
    let [x, y, z] = pose.xyz.0;
    let [roll, pitch, yaw] = pose.rpy.0;
    Isometry3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_euler_angles(roll, pitch, yaw),
    )
}

pub(super) fn joint_kind(joint: &urdf_rs::Joint) -> Result<JointKind> {
    match joint.joint_type {
        urdf_rs::JointType::Revolute | urdf_rs::JointType::Continuous => Ok(JointKind::Revolute),
        urdf_rs::JointType::Prismatic => Ok(JointKind::Prismatic),
        urdf_rs::JointType::Fixed => Ok(JointKind::Fixed),
        _ => Err(SimError::Urdf(format!(
            "joint {}: type {:?} not supported",
            joint.name, joint.joint_type
        ))),
    }
}

pub(super) fn construct_joint(joint: &urdf_rs::Joint, dof: Option<usize>) -> Result<Joint> {
    let kind = joint_kind(joint)?;
    let axis = Vector3::new(joint.axis.xyz[0], joint.axis.xyz[1], joint.axis.xyz[2]);
    let norm = axis.norm();
    let axis = match kind {
        JointKind::Fixed => Vector3::zeros(),
        _ if norm > f64::EPSILON => axis / norm,
        _ => {
            return Err(SimError::Urdf(format!("joint {}: zero axis", joint.name)));
        }
    };
    Ok(Joint {
        name: joint.name.clone(),
        kind,
        axis,
        dof,
    })
}
