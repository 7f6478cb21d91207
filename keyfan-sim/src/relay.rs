//! StatusRelay processor.
//!
//! Routes `OrderStatusChanged` events into the keyed distributor. The
//! output is the submission's [`Completion`], which producers may await to
//! know that every watcher of that order has seen the update.

use crate::events::OrderStatusChanged;
use crate::state::OrderDistributor;
use kanau::processor::Processor;
use keyfan_core::Completion;
use std::convert::Infallible;
use tracing::trace;

pub struct StatusRelay {
    distributor: OrderDistributor,
}

impl StatusRelay {
    pub fn new(distributor: OrderDistributor) -> Self {
        Self { distributor }
    }
}

impl Processor<OrderStatusChanged> for StatusRelay {
    type Output = Completion;
    type Error = Infallible;

    async fn process(&self, event: OrderStatusChanged) -> Result<Completion, Infallible> {
        trace!(order_id = %event.order_id, seq = event.seq, status = ?event.status, "Relaying status change");
        Ok(self.distributor.submit(event))
    }
}
