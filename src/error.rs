use thiserror::Error;

use crate::{graph::GraphError, layer::LayerError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("network is frozen, its graph can no longer change")]
    Frozen,
    #[error("parameter file holds {saved} values but the network has {expected} parameters")]
    ParameterCount { saved: usize, expected: usize },
    #[error("parameter `{name}` has shape {expected:?} but the saved value has shape {saved:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        saved: Vec<usize>,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parameter encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
