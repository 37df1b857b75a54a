use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tracing::info;

use crate::{
    error::{Error, Result},
    graph::Tensor,
    network::Network,
};

/// Paths ending in `.gz`, in any case, are gzip compressed.
fn is_gzip(path: &Path) -> bool {
    path.to_string_lossy().to_lowercase().ends_with(".gz")
}

impl Network {
    /// Write the values of `all_parameters` to `path` in order, bincode encoded. Values are
    /// stored bit for bit, NaN and infinities included.
    pub fn save_params(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let values = self
            .all_parameters()
            .iter()
            .map(|parameter| parameter.get_value())
            .collect::<Vec<Tensor>>();

        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            bincode::serialize_into(&mut encoder, &values)?;
            encoder.finish()?;
        } else {
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, &values)?;
            writer.flush()?;
        }
        self.logged(|| info!(path = %path.display(), count = values.len(), "saved parameters"));
        Ok(())
    }

    /// Read values written by [`Network::save_params`] into `all_parameters`.
    ///
    /// The file must hold exactly one value per parameter with matching shapes. Nothing is
    /// assigned unless every value fits.
    pub fn load_params(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if is_gzip(path) {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let values: Vec<Tensor> = bincode::deserialize_from(reader)?;

        let parameters = self.all_parameters();
        if values.len() != parameters.len() {
            return Err(Error::ParameterCount {
                saved: values.len(),
                expected: parameters.len(),
            });
        }
        for (parameter, value) in parameters.iter().zip(&values) {
            if parameter.shape() != value.shape() {
                return Err(Error::ParameterShape {
                    name: parameter.name().to_string(),
                    expected: parameter.shape(),
                    saved: value.shape().to_vec(),
                });
            }
        }

        self.logged(|| {
            info!(path = %path.display(), "loading parameters");
            for (parameter, value) in parameters.iter().zip(values) {
                info!(parameter = parameter.name(), shape = ?value.shape(), "loaded");
                parameter.set_value(value);
            }
        });
        Ok(())
    }
}
