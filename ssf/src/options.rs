use crate::results::StorageMode;
use crate::Error;
use serde::Deserialize;

/// filter configuration
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterOptions {
    /// prediction error variances `<= epsilon` carry no information
    #[serde(default)]
    pub epsilon: f64,
    /// whether the filter results keep the predicted covariances
    #[serde(default)]
    pub storage: StorageMode,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            storage: StorageMode::Full,
        }
    }
}

/// smoother configuration, shared by the state and the disturbance smoother
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SmootherOptions {
    /// compute covariances/variances in addition to the point estimates
    #[serde(default = "default_calc_variances")]
    pub calc_variances: bool,
}

fn default_calc_variances() -> bool {
    true
}

impl Default for SmootherOptions {
    fn default() -> Self {
        Self {
            calc_variances: default_calc_variances(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Options {
    #[serde(default)]
    pub filter: FilterOptions,
    #[serde(default)]
    pub smoother: SmootherOptions,
}

impl Options {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let options: Self = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let epsilon = self.filter.epsilon;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(Error::InvalidOptions(format!(
                "filter.epsilon must be finite and >= 0, got {}",
                epsilon
            )));
        }
        Ok(())
    }
}
