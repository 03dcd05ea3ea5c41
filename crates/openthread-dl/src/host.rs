//! Brings a Thread stack up from a [`StackConfig`] and tears it down again.

use std::sync::Arc;

use crate::config::StackConfig;
use crate::error::Result;
use crate::manager::ThreadStackManager;
use crate::native::{NativeThreadStack, OpenThreadLibrary};
use crate::platform::EventLoop;
use crate::stack::{StackGuard, ThreadStack};

/// Name of the stack's settings file for a radio with this EUI-64.
pub fn settings_file_name(eui64: [u8; 8]) -> String {
    format!("0_{:x}.data", u64::from_be_bytes(eui64))
}

pub struct ThreadStackHost {
    config: StackConfig,
    library: Arc<OpenThreadLibrary>,
    event_loop: Arc<EventLoop>,
    manager: Option<Arc<ThreadStackManager>>,
    settings_file: Option<String>,
}

impl ThreadStackHost {
    pub fn new(config: StackConfig, library: Arc<OpenThreadLibrary>, event_loop: Arc<EventLoop>) -> Self {
        ThreadStackHost {
            config,
            library,
            event_loop,
            manager: None,
            settings_file: None,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn manager(&self) -> Option<&Arc<ThreadStackManager>> {
        self.manager.as_ref()
    }

    pub fn settings_file(&self) -> Option<&str> {
        self.settings_file.as_deref()
    }

    /// Opens the configured library and starts the native stack on it.
    pub fn init_thread_stack(&mut self) -> Result<Arc<ThreadStackManager>> {
        if let Some(manager) = &self.manager {
            log::info!("Thread stack already initialized");
            return Ok(manager.clone());
        }
        self.library
            .open(self.config.library_path(), self.config.open_flags())?;
        let stack: Arc<dyn ThreadStack> = Arc::new(NativeThreadStack::new(self.library.clone()));
        match self.start(stack) {
            Ok(manager) => Ok(manager),
            Err(e) => {
                self.library.close();
                Err(e)
            }
        }
    }

    /// Starts an already constructed stack, e.g. a simulated one.
    pub fn init_with_stack(&mut self, stack: Arc<dyn ThreadStack>) -> Result<Arc<ThreadStackManager>> {
        if let Some(manager) = &self.manager {
            log::info!("Thread stack already initialized");
            return Ok(manager.clone());
        }
        self.start(stack)
    }

    fn start(&mut self, stack: Arc<dyn ThreadStack>) -> Result<Arc<ThreadStackManager>> {
        let inst = stack.acquire_instance(&self.config.com_port, self.config.debug)?;

        let manager = ThreadStackManager::new(stack.clone(), self.event_loop.clone(), self.config.adapter_config());
        manager.register(&self.event_loop);
        manager.do_init(Some(inst))?;

        let eui64 = {
            let _guard = StackGuard::new(stack.as_ref());
            stack.eui64(inst)?
        };
        let settings_file = settings_file_name(eui64);
        log::info!(
            "Thread stack manager initialized, device {} settings file {}",
            self.config.device_number,
            settings_file
        );

        self.settings_file = Some(settings_file);
        self.manager = Some(manager.clone());
        Ok(manager)
    }

    /// Destroys the instance and closes the library. Safe to call when the
    /// stack was never started.
    pub fn deinit_thread_stack(&mut self) -> Result<()> {
        if let Some(manager) = self.manager.take() {
            manager.deinit();
            manager.stack().destroy_instance()?;
            self.library.close();
            self.settings_file = None;
            log::info!("Thread stack instance destroyed");
        }
        log::info!("Thread stack finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fallback::SimulatedStack;

    fn host() -> ThreadStackHost {
        ThreadStackHost::new(StackConfig::default(), Arc::new(OpenThreadLibrary::new()), EventLoop::new())
    }

    #[test]
    fn settings_file_uses_eui64() {
        assert_eq!(
            settings_file_name([0x18, 0xb4, 0x30, 0x00, 0x00, 0x00, 0x00, 0x01]),
            "0_18b4300000000001.data"
        );
        assert_eq!(settings_file_name([0, 0, 0, 0, 0, 0, 0x12, 0x34]), "0_1234.data");
    }

    #[test]
    fn simulated_stack_lifecycle() {
        let stack = Arc::new(SimulatedStack::new());
        let mut host = host();
        let manager = host.init_with_stack(stack.clone()).unwrap();
        assert_eq!(stack.calls()[0], "otGetInstance");
        assert_eq!(host.settings_file(), Some("0_18b4300000000001.data"));

        let again = host.init_with_stack(stack.clone()).unwrap();
        assert!(Arc::ptr_eq(&manager, &again));
        assert_eq!(stack.call_count("otGetInstance"), 1);

        host.deinit_thread_stack().unwrap();
        assert!(host.manager().is_none());
        assert_eq!(stack.call_count("otDestroyInstance"), 1);
        assert!(manager.instance().is_none());
        stack.clear_calls();
        assert!(matches!(manager.set_thread_enabled(true), Err(Error::Uninitialized)));
        assert!(stack.calls().is_empty());
        host.deinit_thread_stack().unwrap();
        assert_eq!(stack.call_count("otDestroyInstance"), 1);
    }

    #[test]
    fn missing_library_fails_init() {
        let mut host = ThreadStackHost::new(
            StackConfig {
                library_dir: "/nonexistent".into(),
                ..Default::default()
            },
            Arc::new(OpenThreadLibrary::new()),
            EventLoop::new(),
        );
        assert!(matches!(host.init_thread_stack(), Err(Error::Load { .. })));
        assert!(host.manager().is_none());
    }
}
