//! Compute sessions: the execution context every dataframe is bound to.
//!
//! A session is built from an ordered [`SessionConf`], owns a dedicated rayon pool
//! sized from its master URL, and is handed out by a [`SessionProvider`]. Callers
//! that need the session released on every exit path hold it through a
//! [`SessionGuard`].

use anyhow::{Context, Result};
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SessionSettings;
use crate::error::IngestError;

pub mod conf;
mod master;
mod provider;

pub use conf::SessionConf;
use master::{parse_memory, parse_timeout};
pub use master::Master;
pub use provider::{SessionGuard, SessionProvider, SharedSessionProvider};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

const DEFAULT_APP_NAME: &str = "sales-ingest";
const DEFAULT_EXECUTOR_MEMORY: &str = "1g";
const DEFAULT_NETWORK_TIMEOUT: &str = "120s";

pub struct Session {
    id: u64,
    conf: SessionConf,
    app_name: String,
    master: Master,
    executor_memory: u64,
    dynamic_allocation: bool,
    pool: ThreadPool,
    stopped: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("app_name", &self.app_name)
            .field("master", &self.master)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Session {
    /// Validate `conf` and start the executor pool.
    ///
    /// For a standalone master the coordinator is probed first, so an unreachable
    /// cluster fails here rather than at the first write.
    pub fn start(conf: SessionConf) -> Result<Self> {
        if conf.is_empty() {
            debug!("no session options given, using defaults");
        }
        let master = Master::parse(conf.get(conf::MASTER).unwrap_or("local[*]"))?;

        let deploy_mode = conf.get(conf::DEPLOY_MODE).unwrap_or("client");
        if deploy_mode != "client" {
            return Err(IngestError::InvalidOption {
                key: conf::DEPLOY_MODE.to_string(),
                value: deploy_mode.to_string(),
            }
            .into());
        }

        let executor_memory =
            parse_memory(conf.get(conf::EXECUTOR_MEMORY).unwrap_or(DEFAULT_EXECUTOR_MEMORY))?;

        let dynamic_allocation = match conf.get(conf::DYNAMIC_ALLOCATION).unwrap_or("false") {
            "true" => true,
            "false" => false,
            other => {
                return Err(IngestError::InvalidOption {
                    key: conf::DYNAMIC_ALLOCATION.to_string(),
                    value: other.to_string(),
                }
                .into())
            }
        };

        let timeout =
            parse_timeout(conf.get(conf::NETWORK_TIMEOUT).unwrap_or(DEFAULT_NETWORK_TIMEOUT))?;
        master.probe(timeout)?;

        let app_name = conf.get(conf::APP_NAME).unwrap_or(DEFAULT_APP_NAME).to_string();
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let thread_prefix = format!("{}-executor", app_name);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(master.parallelism())
            .thread_name(move |i| format!("{}-{}", thread_prefix, i))
            .build()
            .context("Failed to start executor pool")?;

        info!(
            session_id = id,
            app = %app_name,
            master = ?master,
            executor_memory,
            "session started"
        );

        Ok(Self {
            id,
            conf,
            app_name,
            master,
            executor_memory,
            dynamic_allocation,
            pool,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn conf(&self) -> &SessionConf {
        &self.conf
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    pub fn executor_memory(&self) -> u64 {
        self.executor_memory
    }

    pub fn dynamic_allocation(&self) -> bool {
        self.dynamic_allocation
    }

    /// Number of partitions new dataframes are split into.
    pub fn default_parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` inside the session's executor pool.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!(session_id = self.id, "session stopped");
        }
    }
}

impl SessionSettings {
    /// Option set for this deployment with `app_name` as the application name.
    pub fn to_conf(&self, app_name: &str) -> SessionConf {
        let mut options = SessionConf::new();
        options.set_all([
            (conf::MASTER, self.master.clone()),
            (conf::DEPLOY_MODE, self.deploy_mode.clone()),
            (conf::DRIVER_BIND_ADDRESS, self.driver_bind_address.clone()),
            (conf::APP_NAME, app_name.to_string()),
            (conf::EXECUTOR_MEMORY, self.executor_memory.clone()),
            (conf::DYNAMIC_ALLOCATION, self.dynamic_allocation.to_string()),
            (conf::NETWORK_TIMEOUT, format!("{}s", self.connect_timeout_secs)),
        ]);
        options
    }
}

/// Get the provider's active session, or start one for `app_name` from `settings`.
pub fn build_session(
    provider: &dyn SessionProvider,
    app_name: &str,
    settings: &SessionSettings,
) -> Result<Arc<Session>> {
    let conf = settings.to_conf(app_name);
    debug!(options = conf.len(), ?conf, "requesting session");
    provider.get_or_create(&conf)
}

#[cfg(test)]
pub(crate) fn local_settings(threads: usize) -> SessionSettings {
    SessionSettings {
        master: format!("local[{}]", threads),
        ..SessionSettings::default()
    }
}
