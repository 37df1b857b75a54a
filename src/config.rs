use std::{fmt, fs::File, io::BufReader, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::Dispatch;

use crate::{error::Result, layer::Layer};

/// Settings a `Network` is built with.
///
/// `layers` and `logger` only exist in memory; the remaining fields can be loaded from JSON.
/// Keys other than the named fields are kept in `options` and handed to every layer's
/// `connect`, so layers may define their own switches.
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Layers stacked in order when the network is created.
    #[serde(skip)]
    pub layers: Vec<Box<dyn Layer>>,
    /// Sink for the network's log events. Defaults to the dispatcher current at construction.
    #[serde(skip)]
    pub logger: Option<Dispatch>,
    /// Name of the input placeholder the network creates.
    pub input_name: String,
    /// Accept `f64` inputs in `compute` by converting them to `f32`.
    pub allow_input_downcast: bool,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            logger: None,
            input_name: "x".to_string(),
            allow_input_downcast: true,
            options: Map::new(),
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Deserializes a config from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn with_layer<L: Layer + 'static>(mut self, layer: L) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn with_layers(mut self, layers: Vec<Box<dyn Layer>>) -> Self {
        self.layers.extend(layers);
        self
    }

    pub fn with_logger(self, logger: Dispatch) -> Self {
        Self {
            logger: Some(logger),
            ..self
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Read a passthrough option. `Ok(None)` if the key is absent.
    pub fn option<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> std::result::Result<Option<T>, serde_json::Error> {
        self.options
            .get(key)
            .map(|value| T::deserialize(value))
            .transpose()
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field(
                "layers",
                &self.layers.iter().map(|layer| layer.name()).collect::<Vec<_>>(),
            )
            .field("logger", &self.logger.is_some())
            .field("input_name", &self.input_name)
            .field("allow_input_downcast", &self.allow_input_downcast)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn defaults() {
        let config = NetworkConfig::default();
        assert!(config.layers.is_empty());
        assert_eq!("x", config.input_name);
        assert!(config.allow_input_downcast);
        assert!(config.options.is_empty());
    }

    #[test]
    fn unknown_keys_become_options() {
        let config = NetworkConfig::from_json_str(
            r#"{"input_name": "features", "init_scale": 0.05, "tag": "mlp"}"#,
        )
        .unwrap();
        assert_eq!("features", config.input_name);
        assert!(config.allow_input_downcast);
        assert_eq!(Some(0.05f32), config.option::<f32>("init_scale").unwrap());
        assert_eq!(Some("mlp".to_string()), config.option::<String>("tag").unwrap());
        assert_eq!(None, config.option::<f32>("missing").unwrap());
        assert!(config.option::<f32>("tag").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"allow_input_downcast": false}}"#).unwrap();

        let config = NetworkConfig::load_json(file.path()).unwrap();
        assert!(!config.allow_input_downcast);
        assert_eq!("x", config.input_name);
    }

    #[test]
    fn builder_options() {
        let config = NetworkConfig::new().with_option("init_scale", 0.5);
        assert_eq!(Some(0.5f64), config.option::<f64>("init_scale").unwrap());
    }
}
