use super::bfs::{bfs, roots};
use super::error::{Result, SimError};
use super::utils::*;
use super::Model;
use urdf_rs::read_from_string;

impl Model {
    pub fn from_urdf_string(str: &str) -> Result<Self> {
        let robot = read_from_string(str).map_err(|e| SimError::Urdf(e.to_string()))?;

        // link_id -> link_id, parent to child
        let indices = link_indices(&robot);
        let link_graph = construct_link_graph(&robot, &indices)?;

        // the floating base is the single link without a parent joint
        let root = match roots(&link_graph).as_slice() {
            [root] => *root,
            [] => return Err(SimError::Urdf("robot has no root link".into())),
            many => {
                return Err(SimError::Urdf(format!(
                    "robot has {} root links, expected one",
                    many.len()
                )))
            }
        };

        let bfs = bfs(&link_graph, root);
        if bfs.len() != robot.links.len() {
            return Err(SimError::Urdf("link tree is not connected".into()));
        }

        let (links, n_dof) = construct_links(&robot, &link_graph)?;

        tracing::debug!(
            robot = %robot.name,
            links = links.len(),
            n_dof,
            root = %links[root].name,
            "loaded urdf model"
        );

        Ok(Self {
            name: robot.name.clone(),
            links,
            link_graph,
            bfs,
            root,
            n_dof,
        })
    }

    pub fn from_urdf(url: &str) -> Result<Self> {
        if !url_is_urdf_file(url) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "url is not a urdf file",
            )
            .into());
        }
        Self::from_urdf_string(&read_file(url)?)
    }
}
