//! Helpers shared by the crate's test modules

use std::sync::Arc;

use device_bridge::MemoryAdapter;

use crate::arbitration::FrontendArbiter;
use crate::audit::{AuditConfig, StateAudit};
use crate::buffer::SharedBuffer;
use crate::node::{Clock, NodeServices};

/// Fresh services over an in-memory device backend
pub(crate) fn services() -> (Arc<NodeServices>, Arc<MemoryAdapter>) {
    services_with(Arc::new(FrontendArbiter::new()), Clock::system())
}

/// Services with a caller-chosen arbiter and clock
pub(crate) fn services_with(
    arbiter: Arc<FrontendArbiter>,
    clock: Clock,
) -> (Arc<NodeServices>, Arc<MemoryAdapter>) {
    let adapter = Arc::new(MemoryAdapter::new());
    let audit = Arc::new(StateAudit::new(adapter.clone(), AuditConfig::default()));
    let services = Arc::new(NodeServices {
        buffer: Arc::new(SharedBuffer::new()),
        devices: adapter.clone(),
        arbiter,
        audit,
        clock,
    });
    (services, adapter)
}
