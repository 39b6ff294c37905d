//! Módulos carregáveis: metadados, parâmetros estilo insmod e loader.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::storage::host::BlockLayer;
use crate::util::{KError, KResult};

/// MODULE_* metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub license: &'static str,
    pub description: &'static str,
    pub version: &'static str,
}

/// Lista de parâmetros `nome=valor` como passados ao insmod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamList {
    entries: Vec<(String, Option<String>)>,
}

impl ParamList {
    /// Separa por espaço; `nome` sem `=` vira flag sem valor.
    pub fn parse(args: &str) -> KResult<Self> {
        let mut entries = Vec::new();
        for tok in args.split_whitespace() {
            let (name, value) = match tok.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (tok, None),
            };
            if name.is_empty() {
                crate::pr_warn!("module: empty parameter name in '{}'", tok);
                return Err(KError::Invalid);
            }
            entries.push((name.replace('-', "_"), value));
        }
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// param_set_bool: y/Y/1/n/N/0, sem valor = true.
pub fn parse_bool(name: &str, value: Option<&str>) -> KResult<bool> {
    match value {
        None => Ok(true),
        Some("y") | Some("Y") | Some("1") => Ok(true),
        Some("n") | Some("N") | Some("0") => Ok(false),
        Some(v) => {
            crate::pr_warn!("module: invalid boolean '{}' for parameter {}", v, name);
            Err(KError::Invalid)
        }
    }
}

/// kstrtou64 com base 0: decimal ou `0x` hexa.
pub fn parse_u64(name: &str, value: Option<&str>) -> KResult<u64> {
    let Some(v) = value else {
        crate::pr_warn!("module: parameter {} needs a value", name);
        return Err(KError::Invalid);
    };
    let parsed = match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => v.parse::<u64>(),
    };
    parsed.map_err(|_| {
        crate::pr_warn!("module: invalid number '{}' for parameter {}", v, name);
        KError::Invalid
    })
}

pub fn parse_u32(name: &str, value: Option<&str>) -> KResult<u32> {
    let v = parse_u64(name, value)?;
    u32::try_from(v).map_err(|_| {
        crate::pr_warn!("module: value {} out of range for parameter {}", v, name);
        KError::OutOfRange
    })
}

/// module_init / module_exit.
pub trait KernelModule: Sized {
    const INFO: ModuleInfo;

    /// Typed load-time parameters.
    type Params;

    fn parse_params(args: &ParamList) -> KResult<Self::Params>;

    fn init(params: Self::Params, host: &mut dyn BlockLayer) -> KResult<Self>;

    fn exit(self, host: &mut dyn BlockLayer);
}

/// insmod: parse, init, report a negative errno on failure.
pub fn load_module<M: KernelModule>(args: &str, host: &mut dyn BlockLayer) -> Result<M, i32> {
    let loaded = ParamList::parse(args)
        .and_then(|list| M::parse_params(&list))
        .and_then(|params| M::init(params, host));
    match loaded {
        Ok(m) => {
            crate::pr_info!("module: {} {} loaded", M::INFO.name, M::INFO.version);
            Ok(m)
        }
        Err(e) => {
            crate::pr_err!("module: {}: init failed: {}", M::INFO.name, e);
            Err(e.errno())
        }
    }
}

/// rmmod
pub fn unload_module<M: KernelModule>(module: M, host: &mut dyn BlockLayer) {
    module.exit(host);
    crate::pr_info!("module: {} unloaded", M::INFO.name);
}
