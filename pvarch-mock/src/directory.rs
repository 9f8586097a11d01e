use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pvarch_core::{ClusterDirectory, NodeInfo, PvTypeDescriptor};

/// Cluster directory backed by maps filled in at construction.
pub struct MockDirectory {
    local: NodeInfo,
    nodes: HashMap<String, NodeInfo>,
    descriptors: HashMap<String, PvTypeDescriptor>,
    aliases: HashMap<String, String>,
    legacy: HashMap<String, Vec<String>>,
    externals: Vec<String>,
    started: AtomicBool,
}

impl MockDirectory {
    /// Directory whose local node is `local`; startup is already complete.
    #[must_use]
    pub fn new(local: NodeInfo) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(local.identity.clone(), local.clone());
        Self {
            local,
            nodes,
            descriptors: HashMap::new(),
            aliases: HashMap::new(),
            legacy: HashMap::new(),
            externals: Vec::new(),
            started: AtomicBool::new(true),
        }
    }

    /// Add another cluster node.
    #[must_use]
    pub fn with_node(mut self, node: NodeInfo) -> Self {
        self.nodes.insert(node.identity.clone(), node);
        self
    }

    /// Publish a descriptor under its `pv_name`.
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: PvTypeDescriptor) -> Self {
        self.descriptors
            .insert(descriptor.pv_name.clone(), descriptor);
        self
    }

    /// Register `alias` as another name for `real`.
    #[must_use]
    pub fn with_alias(mut self, alias: &str, real: &str) -> Self {
        self.aliases.insert(alias.to_string(), real.to_string());
        self
    }

    /// List `pv` on the given legacy servers.
    #[must_use]
    pub fn with_legacy(mut self, pv: &str, servers: &[&str]) -> Self {
        self.legacy.insert(
            pv.to_string(),
            servers.iter().map(|s| (*s).to_string()).collect(),
        );
        self
    }

    /// Federate an external appliance.
    #[must_use]
    pub fn with_external(mut self, url: &str) -> Self {
        self.externals.push(url.to_string());
        self
    }

    /// Flip the startup-complete flag.
    pub fn set_startup_complete(&self, done: bool) {
        self.started.store(done, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterDirectory for MockDirectory {
    fn startup_complete(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn local_node(&self) -> NodeInfo {
        self.local.clone()
    }

    async fn node(&self, identity: &str) -> Option<NodeInfo> {
        self.nodes.get(identity).cloned()
    }

    async fn type_descriptor(&self, pv: &str) -> Option<PvTypeDescriptor> {
        self.descriptors.get(pv).cloned()
    }

    async fn real_name_for_alias(&self, pv: &str) -> Option<String> {
        self.aliases.get(pv).cloned()
    }

    async fn legacy_servers_for(&self, pv: &str) -> Vec<String> {
        self.legacy.get(pv).cloned().unwrap_or_default()
    }

    async fn external_appliances(&self) -> Vec<String> {
        self.externals.clone()
    }
}
