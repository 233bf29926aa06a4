use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{OptionMap, SockAddr, StreamOption};
use session::{Receiver, Sender};
use tokio::sync::RwLock;
use tracing::info;
use transport::{AcceptedSocket, PreAcceptDecision, PreAcceptHook};

use crate::access;
use crate::authorizer::{AuthRequest, AuthResult, Authorizer};
use crate::cache::AuthCache;
use crate::config::{EndpointConfig, HookConfig};
use crate::error::ReflectorError;

/// Tells the Reflector whether archived content exists for a requested
/// resource, so a `request` with no live Receiver can still be allowed
/// through to loop-recorder playback. Implemented by the `looprec`
/// crate's `LoopRec` map; injected here to avoid a cyclic crate
/// dependency.
pub trait ArchiveSource: Send + Sync {
    fn is_available(&self, resource: &str, stream_option: &StreamOption) -> bool;
}

/// Result of [`Reflector::on_accept`]: either a new publisher, a live
/// fan-out attach to an existing publisher, or a playback request the
/// caller should route to the loop recorder.
pub enum Accepted {
    Receiver(Arc<Receiver>),
    LiveSender { receiver: Arc<Receiver>, sender: Arc<Sender> },
    PlaybackSender { resource: String, sender: Arc<Sender> },
}

/// Per-endpoint dispatcher: maps resource name to the active
/// [`Receiver`], enforces the publish/play access lists, and consults
/// the external authorizer (through a short-TTL cache) before handing
/// a socket off to the session layer.
pub struct Reflector {
    config: EndpointConfig,
    authorizer: Authorizer,
    cache: AuthCache,
    receivers: RwLock<HashMap<String, Arc<Receiver>>>,
    archive: Option<Arc<dyn ArchiveSource>>,
}

impl Reflector {
    pub fn new(config: EndpointConfig, archive: Option<Arc<dyn ArchiveSource>>) -> Arc<Self> {
        let cache = AuthCache::new(config.cache_age());
        Arc::new(Reflector {
            config,
            authorizer: Authorizer::new(),
            cache,
            receivers: RwLock::new(HashMap::new()),
            archive,
        })
    }

    pub fn bind_addr(&self) -> SockAddr {
        self.config.bind_addr
    }

    pub fn pre_bind_option(&self) -> &OptionMap {
        &self.config.option
    }

    /// The closure registered with the transport listener. Runs only
    /// the synchronous, local access-list check — authorizer HTTP
    /// calls need `async`/caching and are deferred to [`Self::on_accept`]
    /// once the socket is fully established.
    pub fn pre_accept_hook(self: &Arc<Self>) -> PreAcceptHook {
        let this = Arc::clone(self);
        Arc::new(move |peer, stream_option| this.sync_pre_accept(peer, stream_option))
    }

    fn sync_pre_accept(&self, peer: &SockAddr, stream_option: &StreamOption) -> PreAcceptDecision {
        let resource = stream_option.resource_name();
        let mode = stream_option.mode();
        if resource.is_empty() || mode == "bidirectional" {
            return PreAcceptDecision::deny();
        }
        let Some(hook_cfg) = self.hook_config(&mode) else {
            return PreAcceptDecision::deny();
        };
        match access::check(&hook_cfg.access, &resource, peer) {
            Ok(true) => PreAcceptDecision::allow(hook_cfg.option.clone()),
            _ => PreAcceptDecision::deny(),
        }
    }

    fn hook_config(&self, mode: &str) -> Option<&HookConfig> {
        match mode {
            "publish" => Some(&self.config.publish),
            "request" => Some(&self.config.play),
            _ => None,
        }
    }

    /// Runs the authorizer consultation and the existence/archive-based
    /// decision table, then builds the session-level object for the
    /// accepted socket.
    pub async fn on_accept(&self, accepted: AcceptedSocket) -> Result<Accepted, ReflectorError> {
        let resource = accepted.stream_option.resource_name();
        let mode = accepted.stream_option.mode();
        let hook_cfg = self
            .hook_config(&mode)
            .ok_or_else(|| ReflectorError::Denied(format!("unsupported mode {mode}")))?;

        let overrides = self
            .authorize(&accepted.peer, &resource, &mode, &accepted.stream_option, hook_cfg)
            .await?;

        let mut post_options = hook_cfg.option.clone();
        for (key, value) in overrides.iter() {
            post_options.set(key, value);
        }

        match mode.as_str() {
            "publish" => {
                let mut receivers = self.receivers.write().await;
                if receivers.contains_key(&resource) {
                    return Err(ReflectorError::Denied("already publishing".into()));
                }
                let receiver = Arc::new(Receiver::new(
                    accepted.socket,
                    accepted.peer,
                    accepted.stream_option,
                    &post_options,
                )?);
                receivers.insert(resource, receiver.clone());
                Ok(Accepted::Receiver(receiver))
            }
            "request" => {
                let live = self.receivers.read().await.get(&resource).cloned();
                if let Some(receiver) = live {
                    let sender = Arc::new(Sender::new(
                        accepted.socket,
                        accepted.peer,
                        accepted.stream_option,
                        &post_options,
                    )?);
                    Ok(Accepted::LiveSender { receiver, sender })
                } else {
                    let available = self
                        .archive
                        .as_ref()
                        .is_some_and(|a| a.is_available(&resource, &accepted.stream_option));
                    if !available {
                        return Err(ReflectorError::Denied("no source".into()));
                    }
                    let sender = Arc::new(Sender::new(
                        accepted.socket,
                        accepted.peer,
                        accepted.stream_option,
                        &post_options,
                    )?);
                    Ok(Accepted::PlaybackSender { resource, sender })
                }
            }
            _ => unreachable!("checked by hook_config above"),
        }
    }

    pub async fn remove_receiver(&self, resource: &str) {
        self.receivers.write().await.remove(resource);
    }

    pub async fn has_receiver(&self, resource: &str) -> bool {
        self.receivers.read().await.contains_key(resource)
    }

    /// `Some(interval)` when `publish.stats > 0` — the cadence at which
    /// the listener flag should fire and [`Self::log_statistics`] should
    /// run; `None` when periodic statistics are disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.config.publish.stats > 0).then(|| Duration::from_secs(self.config.publish.stats))
    }

    /// The listener-flag callback: snapshots the active receivers and
    /// logs each one's rendered statistics at `level`.
    pub async fn log_statistics(&self, level: u8) {
        let receivers: Vec<(String, Arc<Receiver>)> =
            self.receivers.read().await.iter().map(|(name, r)| (name.clone(), r.clone())).collect();
        for (name, receiver) in receivers {
            let stats = receiver.statistics(level);
            info!(app = %self.config.app, name = %name, stats = %stats, "stats receive");
        }
    }

    async fn authorize(
        &self,
        peer: &SockAddr,
        resource: &str,
        mode: &str,
        stream_option: &StreamOption,
        hook_cfg: &HookConfig,
    ) -> Result<OptionMap, ReflectorError> {
        if !access::check(&hook_cfg.access, resource, peer)? {
            return Err(ReflectorError::Denied("access list".into()));
        }

        let app_category = if mode == "publish" { "publish" } else { "play" };
        let mut overrides = OptionMap::new();
        let hooks: [(&str, &Option<String>); 2] =
            [("pre_accept", &hook_cfg.on_pre_accept), ("accept", &hook_cfg.on_accept)];

        for (call, uri) in hooks {
            let Some(uri) = uri else { continue };
            let request =
                AuthRequest::new(&self.config.app, resource, app_category, call, peer, stream_option);
            let key = request.cache_key(uri);
            let result = self
                .cache
                .get_or_insert_with(key, || self.authorizer.perform(uri, &request))
                .await;
            match result {
                AuthResult::Deny => {
                    return Err(ReflectorError::Denied(format!("authorizer denied ({call})")))
                }
                AuthResult::Allow(opts) => {
                    for (key, value) in opts.iter() {
                        overrides.set(key, value);
                    }
                }
            }
        }
        Ok(overrides)
    }
}
