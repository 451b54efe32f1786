use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use hocon::{Hocon, HoconLoader};

/// Settings loaded from a hocon file with environment variable overrides.
///
/// Lookup order for a key: the process environment (key uppercased), the
/// scoped section of the file, then the file's top level.
#[derive(Debug)]
pub struct ConfigLoader {
    hocon: Hocon,
    env: HashMap<String, String>,
    scope: String,
}

impl ConfigLoader {
    pub fn new(path: impl AsRef<Path>, scope: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let env = std::env::vars().collect::<HashMap<_, _>>();

        let hocon = HoconLoader::new()
            .load_file(path)
            .with_context(|| format!("Failed to find or load config file at: {:?}", path))?
            .hocon()?;

        Ok(Self {
            hocon,
            env,
            scope: scope.into(),
        })
    }

    pub fn load<T: Config>(&self) -> Result<T> {
        T::load(self)
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        if let Some(value) = self.env.get(&name.to_uppercase()) {
            return Some(value.clone());
        }

        self.lookup(name).and_then(|hocon| match hocon {
            Hocon::String(value) => Some(value.clone()),
            Hocon::Integer(value) => Some(value.to_string()),
            Hocon::Real(value) => Some(value.to_string()),
            Hocon::Boolean(value) => Some(value.to_string()),
            _ => None,
        })
    }

    pub fn get_usize(&self, name: &str) -> Option<usize> {
        if let Some(value) = self.env.get(&name.to_uppercase()) {
            return value.parse().ok();
        }

        self.lookup(name).and_then(|hocon| match hocon {
            Hocon::Integer(value) => usize::try_from(*value).ok(),
            Hocon::String(value) => value.parse().ok(),
            _ => None,
        })
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        if let Some(value) = self.env.get(&name.to_uppercase()) {
            return value.parse().ok();
        }

        self.lookup(name).and_then(|hocon| match hocon {
            Hocon::Real(value) => Some(*value as f32),
            Hocon::Integer(value) => Some(*value as f32),
            Hocon::String(value) => value.parse().ok(),
            _ => None,
        })
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        if let Some(value) = self.env.get(&name.to_uppercase()) {
            return value.parse().ok();
        }

        self.lookup(name).and_then(|hocon| match hocon {
            Hocon::Boolean(value) => Some(*value),
            Hocon::String(value) => value.parse().ok(),
            _ => None,
        })
    }

    fn lookup(&self, name: &str) -> Option<&Hocon> {
        let scoped = &self.hocon[self.scope.as_str()];
        if matches!(scoped, Hocon::Hash(_)) {
            let value = &scoped[name];
            if !matches!(value, Hocon::BadValue(_)) {
                return Some(value);
            }
        }

        let value = &self.hocon[name];
        if matches!(value, Hocon::BadValue(_)) {
            None
        } else {
            Some(value)
        }
    }
}

pub trait Config {
    fn load(config: &ConfigLoader) -> Result<Self>
    where
        Self: Sized;
}
