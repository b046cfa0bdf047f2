use crate::blacklist::BlacklistStore;
use crate::config::Config;
use crate::tools::ToolRegistry;
use crate::traits::PlatformApi;

/// Everything a handler needs. Built once in `main` and shared as `Arc<State>`.
pub(crate) struct State {
    pub(crate) config: Config,
    pub(crate) store: BlacklistStore,
    pub(crate) platform: Box<dyn PlatformApi>,
    pub(crate) tools: ToolRegistry,
}
