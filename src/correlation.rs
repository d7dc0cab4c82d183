//! Correlation Service
//!
//! Glues the codec and the poller together for one messenger route:
//! source receipt → messages → ids → relay watch on the destination.

use alloy::primitives::B256;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::extract;
use crate::error::WatchError;
use crate::poller::{RelayPoller, WatchOptions, WatchReport, WatchRequest};
use crate::source::ChainLogSource;
use crate::types::{BridgeMessage, MessageId, MessengerRoute, Outcome, Receipt, RelayEvent};

/// Watches one direction of a messenger pair
///
/// The destination source is shared, so one service can serve concurrent
/// `await_relay` calls.
pub struct CorrelationService<S: ?Sized> {
    destination: Arc<S>,
    route: MessengerRoute,
    poller: RelayPoller<S>,
}

impl<S: ChainLogSource + ?Sized> CorrelationService<S> {
    pub fn new(destination: Arc<S>, route: MessengerRoute) -> Self {
        if destination.chain_id() != route.dest_chain_id {
            warn!(
                source_chain = destination.chain_id(),
                route_chain = route.dest_chain_id,
                "Destination source chain id differs from route"
            );
        }
        let poller = RelayPoller::new(destination.clone(), route.dest_messenger);
        Self {
            destination,
            route,
            poller,
        }
    }

    pub fn route(&self) -> &MessengerRoute {
        &self.route
    }

    /// Messages the route's source messenger emitted in `receipt`
    pub fn messages(&self, receipt: &Receipt) -> Result<Vec<BridgeMessage>, WatchError> {
        Ok(extract(receipt, &self.route)?)
    }

    /// Ids of the messages in `receipt`, in emission order
    pub fn message_ids(&self, receipt: &Receipt) -> Result<Vec<MessageId>, WatchError> {
        Ok(self.messages(receipt)?.iter().map(BridgeMessage::id).collect())
    }

    /// Watch for the relay of every message in `receipt`
    ///
    /// A receipt that does not decode fails before any destination call.
    pub async fn await_relay(
        &self,
        receipt: &Receipt,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Result<WatchReport, WatchError> {
        let ids = self.watchable_ids(receipt, &options)?;
        if ids.is_empty() {
            return Err(WatchError::NoMessages(receipt.tx_hash));
        }

        info!(
            tx = %receipt.tx_hash,
            source_chain = self.route.source_chain_id,
            dest_chain = self.route.dest_chain_id,
            messages = ids.len(),
            "Correlating source transaction"
        );

        let request = WatchRequest::new(ids, options);
        Ok(self.poller.watch(request, cancel).await)
    }

    /// Ids of a successful receipt, checked before anything is polled
    fn watchable_ids(
        &self,
        receipt: &Receipt,
        options: &WatchOptions,
    ) -> Result<Vec<MessageId>, WatchError> {
        options.validate()?;
        if !receipt.status {
            return Err(WatchError::Reverted(receipt.tx_hash));
        }
        let ids = self.message_ids(receipt)?;
        if ids.is_empty() {
            return Err(WatchError::NoMessages(receipt.tx_hash));
        }
        Ok(ids)
    }

    /// Fetch `tx_hash` from the source chain, then [`Self::await_relay`]
    pub async fn await_relay_for_tx<Src: ChainLogSource + ?Sized>(
        &self,
        source: &Src,
        tx_hash: B256,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Result<WatchReport, WatchError> {
        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WatchError::Cancelled),
            receipt = source.get_receipt(tx_hash) => receipt?,
        };
        let receipt = receipt.ok_or(WatchError::ReceiptNotFound(tx_hash))?;

        self.await_relay(&receipt, options, cancel).await
    }

    /// Destination receipt of the transaction that relayed a message
    pub async fn relay_receipt(&self, relay: &RelayEvent) -> Result<Receipt, WatchError> {
        self.destination
            .get_receipt(relay.dest_tx_hash)
            .await?
            .ok_or(WatchError::ReceiptNotFound(relay.dest_tx_hash))
    }

    /// Watch only the first message of `receipt`
    pub async fn await_first_relay(
        &self,
        receipt: &Receipt,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Result<(MessageId, Outcome), WatchError> {
        let first = self.watchable_ids(receipt, &options)?[0];

        let mut report = self
            .poller
            .watch(WatchRequest::new([first], options), cancel)
            .await;
        let outcome = report.outcomes.remove(&first).unwrap_or(Outcome::Cancelled);
        Ok((first, outcome))
    }
}
