use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::queue::{LaneContext, TaskQueue};

/// Per-port lanes, created on the first command to each port.
pub struct LaneTable {
    lanes: BTreeMap<u8, Arc<TaskQueue>>,
    context: Arc<LaneContext>,
}

impl LaneTable {
    pub(crate) fn new(context: Arc<LaneContext>) -> Self {
        Self {
            lanes: BTreeMap::new(),
            context,
        }
    }

    /// The lane for `port`, created if this is the port's first command.
    pub(crate) fn lane_for(&mut self, port: u8) -> Arc<TaskQueue> {
        let context = &self.context;
        let lane = self.lanes.entry(port).or_insert_with(|| {
            debug!(port, "creating port lane");
            Arc::new(TaskQueue::new(format!("port-{port}"), Arc::clone(context)))
        });
        Arc::clone(lane)
    }

    pub fn get(&self, port: u8) -> Option<Arc<TaskQueue>> {
        self.lanes.get(&port).cloned()
    }

    /// Ports that have a lane, ascending.
    pub fn port_ids(&self) -> Vec<u8> {
        self.lanes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Dispose every lane and forget them.
    pub fn dispose_all(&mut self) {
        for (port, lane) in std::mem::take(&mut self.lanes) {
            debug!(port, pending = lane.len(), "disposing port lane");
            lane.dispose();
        }
    }
}

impl std::fmt::Debug for LaneTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneTable")
            .field("ports", &self.port_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use hubwire_transport::MemoryTransport;

    use super::*;
    use crate::config::MessengerConfig;

    fn table() -> LaneTable {
        let transport = Arc::new(MemoryTransport::new());
        let (context, _dispatcher) = LaneContext::for_memory(&transport, MessengerConfig::default());
        LaneTable::new(context)
    }

    #[tokio::test]
    async fn lanes_are_created_once_per_port() {
        let mut lanes = table();
        assert!(lanes.is_empty());

        let first = lanes.lane_for(3);
        let again = lanes.lane_for(3);
        lanes.lane_for(1);

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.label(), "port-3");
        assert_eq!(lanes.port_ids(), vec![1, 3]);
        assert!(lanes.get(2).is_none());
    }

    #[tokio::test]
    async fn dispose_all_empties_table() {
        let mut lanes = table();
        let lane = lanes.lane_for(0);
        lanes.dispose_all();

        assert!(lane.is_disposed());
        assert_eq!(lanes.len(), 0);
    }
}
