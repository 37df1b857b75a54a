pub mod activation;
pub mod config;
pub mod error;
pub mod graph;
pub mod layer;
pub mod network;

pub use config::NetworkConfig;
pub use error::{Error, Result};
pub use graph::{Expr, Placeholder, Shared, Tensor};
pub use layer::{Layer, LayerBase, Monitor};
pub use network::{Network, Objective, Regressor, Report};

/// Assert two arrays have the same shape and relatively equal elements.
/// Arrays of different static dimension types are compared through their dynamic views.
#[macro_export]
macro_rules! assert_rel_eq_arr {
    ($actual:expr, $expected:expr) => {{
        let actual = &$actual;
        let expected = &$expected;
        let actual = actual.view().into_dyn();
        let expected = expected.view().into_dyn();
        assert_eq!(actual.shape(), expected.shape());
        ndarray::Zip::from(&actual)
            .and(&expected)
            .for_each(|v, w| {
                approx::assert_relative_eq!(v, w, epsilon = 1e-6, max_relative = 1e-5);
            });
    }};
}
