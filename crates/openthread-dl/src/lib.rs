//! Runtime-loaded OpenThread with a Thread stack adapter on top
//!
//! Opens the OpenThread shared library at runtime and resolves its entry
//! points into a binding table. The adapter drives the stack through the
//! [`ThreadStack`] trait. Entry points the library lacks surface as
//! [`Error::Unsupported`]; a pure-Rust simulated stack is available when
//! explicitly requested.

pub mod alloc;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod dnssd;
pub mod error;
pub mod fallback;
pub mod ffi;
pub mod host;
pub mod manager;
pub mod native;
pub mod platform;
pub mod srp;
pub mod stack;

use std::sync::Arc;

pub use config::StackConfig;
pub use dataset::OperationalDataset;
pub use error::{Error, OtError, Result};
pub use fallback::SimulatedStack;
pub use host::ThreadStackHost;
pub use manager::{AdapterConfig, ThreadStackManager};
pub use native::{NativeThreadStack, OpenThreadLibrary};
pub use platform::{DeviceEvent, EventLoop, PlatformLayer};
pub use stack::{StackGuard, ThreadStack};

/// Entry points the adapter cannot run without.
const CORE_SYMBOLS: &[&str] = &[
    "otGetInstance",
    "otLock",
    "otUnlock",
    "otSetStateChangedCallback",
    "otThreadGetDeviceRole",
    "otThreadSetEnabled",
    "otDatasetSetActiveTlvs",
];

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Native,
    Simulated,
}

/// Check which backend the library can fully serve
pub fn get_backend(library: &OpenThreadLibrary) -> Backend {
    if !library.is_open() {
        return Backend::Simulated;
    }
    let symbols = library.symbols();
    match CORE_SYMBOLS.iter().find(|name| !symbols.is_resolved(name)) {
        None => Backend::Native,
        Some(missing) => {
            log::warn!("{} missing from the loaded library", missing);
            Backend::Simulated
        }
    }
}

/// Get backend info as string
pub fn get_backend_info(library: &OpenThreadLibrary) -> String {
    match get_backend(library) {
        Backend::Native => match library.path() {
            Some(path) => format!("native ({})", path.display()),
            None => "native".to_string(),
        },
        Backend::Simulated => "simulated".to_string(),
    }
}

/// Builds the requested backend. A native stack over an incomplete library
/// still works; operations needing a missing entry point fail with
/// [`Error::Unsupported`].
pub fn create_stack(library: Arc<OpenThreadLibrary>, backend: Backend) -> Arc<dyn ThreadStack> {
    match backend {
        Backend::Native => {
            if get_backend(&library) != Backend::Native {
                log::warn!("native stack over an incomplete library");
            }
            Arc::new(NativeThreadStack::new(library))
        }
        Backend::Simulated => {
            log::info!("using the simulated stack");
            Arc::new(SimulatedStack::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_library_is_simulated() {
        let library = OpenThreadLibrary::new();
        assert_eq!(get_backend(&library), Backend::Simulated);
        assert_eq!(get_backend_info(&library), "simulated");
    }

    #[test]
    fn core_symbols_are_cataloged() {
        let library = OpenThreadLibrary::new();
        for name in CORE_SYMBOLS {
            assert!(library.catalog().contains(name), "{} not in catalog", name);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn incomplete_library_stays_native() {
        let library = Arc::new(OpenThreadLibrary::new());
        library.open("libc.so.6", ffi::default_open_flags()).unwrap();
        assert_eq!(get_backend(&library), Backend::Simulated);

        let stack = create_stack(library.clone(), Backend::Native);
        assert!(matches!(
            stack.acquire_instance("/dev/null", 0),
            Err(Error::Unsupported("otGetInstance"))
        ));
        assert!(matches!(stack.init_single(), Err(Error::Unsupported("otInstanceInitSingle"))));
        library.close();
    }

    #[test]
    fn simulated_backend_is_explicit() {
        let stack = create_stack(Arc::new(OpenThreadLibrary::new()), Backend::Simulated);
        let inst = stack.acquire_instance("/dev/null", 0).unwrap();
        assert_eq!(inst, stack.init_single().unwrap());
    }
}
