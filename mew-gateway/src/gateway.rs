//! The top-level gateway: every configured space, kept alive for the
//! process lifetime and shared by every connection.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::GatewayConfig;
use crate::space::Space;

pub struct Gateway {
    config: Arc<GatewayConfig>,
    spaces: DashMap<String, Arc<Space>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let spaces = DashMap::new();
        for space_config in &config.spaces {
            spaces.insert(space_config.name.clone(), Arc::new(Space::new(space_config.name.clone())));
        }
        Self {
            config: Arc::new(config),
            spaces,
        }
    }

    pub fn config(&self) -> Arc<GatewayConfig> {
        Arc::clone(&self.config)
    }

    pub fn space(&self, name: &str) -> Option<Arc<Space>> {
        self.spaces.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Every participant currently connected, across every space.
    pub fn all_participants(&self) -> Vec<Arc<crate::participant::Participant>> {
        self.spaces.iter().flat_map(|e| e.value().participants()).collect()
    }

    /// A point-in-time view of gateway load, for operators and tests.
    /// Deliberately not a Prometheus endpoint — just an in-process
    /// accessor.
    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            spaces: self
                .spaces
                .iter()
                .map(|e| SpaceSnapshot {
                    name: e.key().clone(),
                    participants: e.value().participant_count(),
                    open_streams: e.value().open_stream_count(),
                    envelopes_routed: e.value().envelopes_routed(),
                    capability_violations: e.value().capability_violations(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpaceSnapshot {
    pub name: String,
    pub participants: usize,
    pub open_streams: usize,
    pub envelopes_routed: u64,
    pub capability_violations: u64,
}

#[derive(Debug, Clone)]
pub struct GatewaySnapshot {
    pub spaces: Vec<SpaceSnapshot>,
}
