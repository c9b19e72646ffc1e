// Robot descriptions shared by the unit tests.

use std::fmt::Write;

use nalgebra::{DVector, Isometry3};

use crate::constraint::EndEffector;
use crate::floating_base::FloatingBaseModel;
use crate::Model;

pub(crate) const PENDULUM_URDF: &str = r#"<robot name="pendulum">
  <link name="base">
    <inertial>
      <origin xyz="0 0 0" rpy="0 0 0"/>
      <mass value="1.0"/>
      <inertia ixx="0.01" ixy="0" ixz="0" iyy="0.01" iyz="0" izz="0.01"/>
    </inertial>
  </link>
  <link name="arm">
    <inertial>
      <origin xyz="0 0 -0.5" rpy="0 0 0"/>
      <mass value="1.0"/>
      <inertia ixx="0.02" ixy="0" ixz="0" iyy="0.02" iyz="0" izz="0.001"/>
    </inertial>
  </link>
  <link name="tip">
    <inertial>
      <origin xyz="0 0 0" rpy="0 0 0"/>
      <mass value="0.1"/>
      <inertia ixx="0.0001" ixy="0" ixz="0" iyy="0.0001" iyz="0" izz="0.0001"/>
    </inertial>
  </link>
  <joint name="hinge" type="revolute">
    <parent link="base"/>
    <child link="arm"/>
    <origin xyz="0 0 -0.1" rpy="0 0 0"/>
    <axis xyz="0 2 0"/>
    <limit lower="-3.14" upper="3.14" effort="100" velocity="10"/>
  </joint>
  <joint name="tip_fixed" type="fixed">
    <parent link="base"/>
    <child link="tip"/>
    <origin xyz="0 0 -1" rpy="0 0 0"/>
  </joint>
</robot>
"#;

pub(crate) const HUMANOID_LINKS: usize = 27;

const FOOT_SOLE: [f64; 3] = [0.0, 0.0, -0.05];
const PALM: [f64; 3] = [0.0, 0.0, -0.08];

fn link(out: &mut String, name: &str, mass: f64, com: [f64; 3]) {
    let i = 0.01 * mass + 0.001;
    let _ = write!(
        out,
        r#"<link name="{name}"><inertial><origin xyz="{} {} {}" rpy="0 0 0"/><mass value="{mass}"/><inertia ixx="{i}" ixy="0" ixz="0" iyy="{i}" iyz="0" izz="{i}"/></inertial></link>"#,
        com[0], com[1], com[2]
    );
}

fn joint(out: &mut String, name: &str, kind: &str, parent: &str, child: &str, xyz: [f64; 3], axis: &str) {
    let _ = write!(
        out,
        r#"<joint name="{name}" type="{kind}"><parent link="{parent}"/><child link="{child}"/><origin xyz="{} {} {}" rpy="0 0 0"/><axis xyz="{axis}"/><limit lower="-3.14" upper="3.14" effort="200" velocity="20"/></joint>"#,
        xyz[0], xyz[1], xyz[2]
    );
}

/// 25-dof humanoid: torso yaw, two 6-dof legs, two 6-dof arms, fixed head.
pub(crate) fn humanoid_urdf() -> String {
    let mut out = String::from(r#"<robot name="humanoid">"#);
    link(&mut out, "pelvis", 8.0, [0.0, 0.0, 0.0]);
    link(&mut out, "torso", 15.0, [0.0, 0.0, 0.2]);
    link(&mut out, "head", 3.0, [0.0, 0.0, 0.1]);
    joint(&mut out, "torso_yaw", "revolute", "pelvis", "torso", [0.0, 0.0, 0.1], "0 0 1");
    joint(&mut out, "head_fixed", "fixed", "torso", "head", [0.0, 0.0, 0.45], "1 0 0");

    for (side, y) in [("l", 1.0), ("r", -1.0)] {
        let chain = [
            ("hip_yaw", "hip_yaw_link", 0.5, [0.0, 0.0, 0.0], [0.0, 0.1 * y, -0.05], "0 0 1"),
            ("hip_roll", "hip_roll_link", 0.5, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], "1 0 0"),
            ("hip_pitch", "thigh", 4.0, [0.0, 0.0, -0.2], [0.0, 0.0, 0.0], "0 1 0"),
            ("knee", "shank", 3.0, [0.0, 0.0, -0.2], [0.0, 0.0, -0.4], "0 1 0"),
            ("ankle_pitch", "ankle_link", 0.3, [0.0, 0.0, 0.0], [0.0, 0.0, -0.4], "0 1 0"),
            ("ankle_roll", "foot", 1.0, [0.03, 0.0, -0.03], [0.0, 0.0, 0.0], "1 0 0"),
        ];
        add_chain(&mut out, side, "pelvis", &chain);
    }
    for (side, y) in [("l", 1.0), ("r", -1.0)] {
        let chain = [
            ("shoulder_pitch", "shoulder_link", 0.5, [0.0, 0.0, 0.0], [0.0, 0.2 * y, 0.3], "0 1 0"),
            ("shoulder_roll", "shoulder_roll_link", 0.5, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], "1 0 0"),
            ("shoulder_yaw", "upper_arm", 2.0, [0.0, 0.0, -0.12], [0.0, 0.0, 0.0], "0 0 1"),
            ("elbow", "forearm", 1.5, [0.0, 0.0, -0.12], [0.0, 0.0, -0.25], "0 1 0"),
            ("wrist_yaw", "wrist_link", 0.3, [0.0, 0.0, 0.0], [0.0, 0.0, -0.25], "0 0 1"),
            ("wrist_pitch", "hand", 0.5, [0.0, 0.0, -0.05], [0.0, 0.0, 0.0], "0 1 0"),
        ];
        add_chain(&mut out, side, "torso", &chain);
    }
    out.push_str("</robot>");
    out
}

type ChainLink<'a> = (&'a str, &'a str, f64, [f64; 3], [f64; 3], &'a str);

fn add_chain(out: &mut String, side: &str, root: &str, chain: &[ChainLink<'_>]) {
    let mut parent = root.to_string();
    for (joint_name, link_name, mass, com, origin, axis) in chain {
        let child = format!("{side}_{link_name}");
        link(out, &child, *mass, *com);
        joint(
            out,
            &format!("{side}_{joint_name}"),
            "revolute",
            &parent,
            &child,
            *origin,
            axis,
        );
        parent = child;
    }
}

pub(crate) fn humanoid_model() -> Model {
    Model::from_urdf_string(&humanoid_urdf()).unwrap()
}

/// Humanoid with feet and hands registered, standard gravity.
pub(crate) fn humanoid() -> FloatingBaseModel {
    let sole = Isometry3::translation(FOOT_SOLE[0], FOOT_SOLE[1], FOOT_SOLE[2]);
    let palm = Isometry3::translation(PALM[0], PALM[1], PALM[2]);
    FloatingBaseModel::new(humanoid_model())
        .with_frame(EndEffector::LeftFoot, "l_foot", sole)
        .unwrap()
        .with_frame(EndEffector::RightFoot, "r_foot", sole)
        .unwrap()
        .with_frame(EndEffector::LeftHand, "l_hand", palm)
        .unwrap()
        .with_frame(EndEffector::RightHand, "r_hand", palm)
        .unwrap()
}

/// Bent knees, feet flat, arms slightly flexed.
pub(crate) fn standing_posture(model: &Model) -> DVector<f64> {
    let mut q = DVector::zeros(model.n_dof);
    let mut set = |name: &str, value: f64| {
        let index = model.joint_index(name).unwrap();
        q[index] = value;
    };
    for side in ["l", "r"] {
        set(&format!("{side}_hip_pitch"), -0.3);
        set(&format!("{side}_knee"), 0.6);
        set(&format!("{side}_ankle_pitch"), -0.3);
        set(&format!("{side}_elbow"), -0.4);
    }
    q
}
