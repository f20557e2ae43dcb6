//! mini.toml parsing.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "mini.toml";

/// Number of allocatable general-purpose registers the x86-64 backend knows about.
pub const MAX_REGISTERS: usize = 7;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compiler: CompilerSection,
    pub codegen: CodegenSection,
    pub interpreter: InterpreterSection,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "interpreter")]
    Interpreter,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSection {
    pub target: Target,
    /// Run the (placeholder) optimization pass between lowering and the backend.
    pub optimize: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenSection {
    /// How many of the allocatable registers to use, in allocation order.
    pub registers: usize,
}

impl Default for CodegenSection {
    fn default() -> Self {
        Self {
            registers: MAX_REGISTERS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterSection {
    pub max_steps: u64,
    pub max_call_depth: usize,
}

impl Default for InterpreterSection {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 512,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> io::Result<Config> {
        let config: Config =
            toml::from_str(s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> io::Result<String> {
        toml::to_string(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn validate(&self) -> io::Result<()> {
        if self.codegen.registers == 0 || self.codegen.registers > MAX_REGISTERS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "codegen.registers must be between 1 and {}, got {}",
                    MAX_REGISTERS, self.codegen.registers
                ),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> io::Result<Config> {
    let s = std::fs::read_to_string(path)?;
    Config::from_toml_str(&s)
}

/// Nearest `mini.toml` in `start` or one of its ancestors.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}
