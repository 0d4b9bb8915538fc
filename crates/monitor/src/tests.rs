//! End-to-end scan scenarios against in-memory SQLite with a scripted chain.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use metrics_exporter_prometheus::PrometheusBuilder;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use whalewatch_domain::model::{
    Address, Direction, DispatchId, DispatchRecord, FeeSample, FeeUnit, NewDispatchRecord,
    NewTransaction, NewWatchedAddress, OwnerId, TransactionId, TransactionRecord, TxKind,
    WatchedAddress, Wei,
};
use whalewatch_domain::services::InMemoryQuoteCache;
use whalewatch_domain::storage::{
    CursorStore, DispatchStore, FeeHistoryStore, MonitorStorage, StorageError, StorageResult,
    TransactionStore, WatchlistStore,
};
use whalewatch_storage::SeaOrmStorage;

use crate::alerts::{AlertOutcome, DispatchOutcome};
use crate::notify::{AlertPayload, DispatchError, NotificationDispatcher};
use crate::pipeline::Pipeline;
use crate::quote::{PriceOracle, QuoteError, QuoteHandle, QuoteSource};
use crate::rpc::{ChainBlock, ChainConnector, ChainError, ChainTransaction};
use crate::worker::{MonitorError, Scanner, ScannerSettings};

const WHALE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const EXCHANGE: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const STRANGER: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

#[derive(Default)]
struct ChainState {
    tip: u64,
    tip_down: bool,
    blocks: HashMap<u64, Result<ChainBlock, ChainError>>,
}

#[derive(Clone, Default)]
struct ScriptedChain {
    state: Arc<Mutex<ChainState>>,
}

impl ScriptedChain {
    fn push(&self, height: u64, block: Result<ChainBlock, ChainError>) {
        let mut state = self.state.lock().unwrap();
        state.tip = state.tip.max(height);
        state.blocks.insert(height, block);
    }

    fn push_block(&self, block: ChainBlock) {
        self.push(block.height, Ok(block));
    }

    fn set_tip_down(&self, down: bool) {
        self.state.lock().unwrap().tip_down = down;
    }
}

#[async_trait]
impl ChainConnector for ScriptedChain {
    async fn tip_height(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.tip_down {
            return Err(ChainError::Transient("connection refused".into()));
        }
        Ok(state.tip)
    }

    async fn block(&self, height: u64) -> Result<ChainBlock, ChainError> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(&height)
            .cloned()
            .unwrap_or_else(|| Err(ChainError::Transient(format!("block {height} missing"))))
    }
}

#[derive(Clone, Default)]
struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<(String, String, Direction)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    fn sent(&self) -> Vec<(String, String, Direction)> {
        self.sent.lock().unwrap().clone()
    }

    fn hashes(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, hash, _)| hash).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, contact: &str, payload: &AlertPayload) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("connection reset".into()));
        }
        self.sent.lock().unwrap().push((
            contact.to_string(),
            payload.tx_hash.clone(),
            payload.direction,
        ));
        Ok(())
    }
}

struct Harness {
    storage: SeaOrmStorage,
    chain: ScriptedChain,
    dispatcher: RecordingDispatcher,
    cache: Arc<InMemoryQuoteCache>,
}

impl Harness {
    async fn new() -> Self {
        Self {
            storage: SeaOrmStorage::connect("sqlite::memory:").await.unwrap(),
            chain: ScriptedChain::default(),
            dispatcher: RecordingDispatcher::default(),
            cache: Arc::new(InMemoryQuoteCache::default()),
        }
    }

    fn scanner(&self, start_height: Option<u64>) -> Scanner<SeaOrmStorage, ScriptedChain> {
        self.scanner_over(self.storage.clone(), start_height)
    }

    fn scanner_over<S: MonitorStorage>(
        &self,
        storage: S,
        start_height: Option<u64>,
    ) -> Scanner<S, ScriptedChain> {
        let pipeline = Pipeline::new(
            Arc::new(self.dispatcher.clone()),
            QuoteHandle::new(self.cache.clone(), "usd"),
            FeeUnit::Gwei,
            Duration::from_secs(2),
        );
        Scanner::new(
            storage,
            self.chain.clone(),
            pipeline,
            ScannerSettings {
                start_height,
                poll_interval: Duration::from_secs(1),
                call_timeout: Duration::from_secs(2),
                backoff_initial: Duration::from_millis(10),
                backoff_max: Duration::from_millis(100),
            },
        )
    }

    async fn register(&self, contact: &str, address: &str, threshold: &str) -> OwnerId {
        let owner_id = self.storage.insert_owner(contact).await.unwrap();
        self.storage
            .insert_watched_address(NewWatchedAddress {
                owner_id,
                address: Address::parse(address).unwrap(),
                display_name: format!("{contact} wallet"),
                threshold: BigDecimal::from_str(threshold).unwrap(),
                alerts_enabled: true,
            })
            .await
            .unwrap();
        owner_id
    }
}

fn ether(amount: &str) -> Wei {
    Wei::from_ether(&BigDecimal::from_str(amount).unwrap()).unwrap()
}

fn transfer(hash: &str, from: &str, to: Option<&str>, amount: &str) -> ChainTransaction {
    ChainTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.map(str::to_string),
        value: ether(amount),
        payload: "0x".to_string(),
        gas_price: Wei::from_u128(20_000_000_000),
    }
}

fn block(height: u64, transactions: Vec<ChainTransaction>) -> ChainBlock {
    ChainBlock {
        height,
        timestamp: DateTime::from_timestamp(1_700_000_000 + height as i64 * 12, 0).unwrap(),
        fee_indicator: Some(Wei::from_u128(15_000_000_000)),
        transactions,
    }
}

#[tokio::test]
async fn large_outgoing_transfer_alerts_once_across_replays() {
    let h = Harness::new().await;
    let owner = h.register("r@example.com", WHALE, "100").await;
    h.chain
        .push_block(block(10, vec![transfer("0x10aa", WHALE, Some(EXCHANGE), "150")]));

    let scanner = h.scanner(Some(10));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    assert_eq!(cursor.height(), 9);

    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(cursor.height(), 10);
    assert_eq!(h.storage.load_cursor().await.unwrap(), Some(10));
    assert_eq!(
        report.blocks[0].alerts,
        vec![AlertOutcome {
            owner_id: owner,
            direction: Direction::Outgoing,
            outcome: DispatchOutcome::Sent,
        }]
    );

    let tx = h.storage.find_transaction("0x10aa").await.unwrap().unwrap();
    assert_eq!(tx.kind, TxKind::Transfer);
    assert!(tx.is_large);
    let record = h.storage.find_dispatch_record(owner, tx.id).await.unwrap().unwrap();
    assert!(record.dispatched);
    assert_eq!(
        h.dispatcher.sent(),
        vec![("r@example.com".to_string(), "0x10aa".to_string(), Direction::Outgoing)]
    );

    let mut cursor = scanner.reset_cursor(9).await.unwrap();
    let replay = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(replay.blocks[0].alerts[0].outcome, DispatchOutcome::AlreadyDispatched);
    assert_eq!(h.dispatcher.sent().len(), 1);
    assert_eq!(h.storage.recent_transactions(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn threshold_boundary_is_inclusive() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "100").await;
    h.chain.push_block(block(
        1,
        vec![
            transfer("0x01", WHALE, Some(EXCHANGE), "100"),
            transfer("0x02", WHALE, Some(EXCHANGE), "99.999"),
        ],
    ));

    let scanner = h.scanner(Some(1));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    scanner.tick(&mut cursor, &shutdown).await.unwrap();

    assert_eq!(h.dispatcher.hashes(), vec!["0x01".to_string()]);
    let below = h.storage.find_transaction("0x02").await.unwrap().unwrap();
    assert!(!below.is_large);
}

#[tokio::test]
async fn thresholds_apply_per_registrant() {
    let h = Harness::new().await;
    let low = h.register("low@example.com", WHALE, "100").await;
    h.register("high@example.com", WHALE, "200").await;
    let receiver = h.register("desk@example.com", EXCHANGE, "1").await;
    h.chain
        .push_block(block(3, vec![transfer("0x03", WHALE, Some(EXCHANGE), "150")]));

    let scanner = h.scanner(Some(3));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();

    let alerted: Vec<(OwnerId, Direction)> = report.blocks[0]
        .alerts
        .iter()
        .map(|alert| (alert.owner_id, alert.direction))
        .collect();
    assert_eq!(
        alerted,
        vec![(low, Direction::Outgoing), (receiver, Direction::Incoming)]
    );
    let contacts: Vec<String> = h.dispatcher.sent().into_iter().map(|(c, _, _)| c).collect();
    assert_eq!(contacts, vec!["low@example.com", "desk@example.com"]);
}

#[tokio::test]
async fn blocks_dispatch_in_ascending_order() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "1").await;
    h.chain
        .push_block(block(21, vec![transfer("0x21", EXCHANGE, Some(WHALE), "5")]));
    h.chain
        .push_block(block(20, vec![transfer("0x20", WHALE, Some(EXCHANGE), "5")]));

    let scanner = h.scanner(Some(20));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();

    let heights: Vec<u64> = report.blocks.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![20, 21]);
    assert_eq!(h.dispatcher.hashes(), vec!["0x20".to_string(), "0x21".to_string()]);
    assert_eq!(h.storage.recent_fee_samples(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn restart_after_lost_cursor_write_sends_nothing_twice() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "1").await;
    h.chain
        .push_block(block(30, vec![transfer("0x30", WHALE, Some(EXCHANGE), "2")]));

    let (_stop, shutdown) = watch::channel(false);
    let first = h.scanner(Some(30));
    let mut cursor = first.initial_cursor().await.unwrap();
    first.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(h.dispatcher.sent().len(), 1);

    // Block 30 was committed but the process died before its cursor landed.
    h.storage.store_cursor(29).await.unwrap();

    let restarted = h.scanner(Some(30));
    let mut cursor = restarted.initial_cursor().await.unwrap();
    assert_eq!(cursor.height(), 29);
    let report = restarted.tick(&mut cursor, &shutdown).await.unwrap();

    assert_eq!(cursor.height(), 30);
    assert_eq!(report.blocks[0].alerts[0].outcome, DispatchOutcome::AlreadyDispatched);
    assert_eq!(h.dispatcher.sent().len(), 1);
}

#[tokio::test]
async fn failed_dispatch_is_retried_on_reprocessing() {
    let h = Harness::new().await;
    let owner = h.register("r@example.com", WHALE, "1").await;
    h.chain
        .push_block(block(40, vec![transfer("0x40", WHALE, Some(EXCHANGE), "2")]));
    h.dispatcher.failing.store(true, Ordering::SeqCst);

    let scanner = h.scanner(Some(40));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();

    assert_eq!(report.blocks[0].alerts[0].outcome, DispatchOutcome::Failed);
    assert_eq!(cursor.height(), 40);
    let tx = h.storage.find_transaction("0x40").await.unwrap().unwrap();
    assert!(!h.storage.dispatch_record_exists(owner, tx.id).await.unwrap());

    h.dispatcher.failing.store(false, Ordering::SeqCst);
    let mut cursor = scanner.reset_cursor(39).await.unwrap();
    let retry = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(retry.blocks[0].alerts[0].outcome, DispatchOutcome::Sent);
    assert_eq!(h.dispatcher.hashes(), vec!["0x40".to_string()]);
}

#[tokio::test]
async fn transient_failures_leave_cursor_in_place() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "1").await;
    h.chain.push_block(block(50, vec![]));
    h.chain.push(51, Err(ChainError::Transient("timeout".into())));

    let scanner = h.scanner(Some(50));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    let err = scanner.tick(&mut cursor, &shutdown).await.unwrap_err();
    assert!(matches!(err, MonitorError::Chain(ChainError::Transient(_))));
    assert_eq!(cursor.height(), 50);
    assert_eq!(h.storage.load_cursor().await.unwrap(), Some(50));

    h.chain.set_tip_down(true);
    assert!(scanner.tick(&mut cursor, &shutdown).await.is_err());
    assert_eq!(cursor.height(), 50);

    h.chain.set_tip_down(false);
    h.chain
        .push_block(block(51, vec![transfer("0x51", WHALE, Some(EXCHANGE), "3")]));
    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(report.blocks[0].height, 51);
    assert_eq!(cursor.height(), 51);
    assert_eq!(h.dispatcher.hashes(), vec!["0x51".to_string()]);
}

#[tokio::test]
async fn undecodable_blocks_and_transactions_are_skipped() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "1").await;
    h.chain.push(60, Err(ChainError::Malformed("bad timestamp".into())));
    h.chain.push_block(block(
        61,
        vec![
            transfer("0x61bad", "0xnot-hex", Some(WHALE), "9"),
            transfer("0x61", STRANGER, Some(WHALE), "9"),
        ],
    ));

    let scanner = h.scanner(Some(60));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();

    assert_eq!(report.skipped, vec![60]);
    assert_eq!(report.blocks[0].recorded, 1);
    assert_eq!(cursor.height(), 61);
    assert!(h.storage.find_transaction("0x61bad").await.unwrap().is_none());
    assert_eq!(h.dispatcher.sent()[0].2, Direction::Incoming);
}

#[tokio::test]
async fn fresh_install_starts_at_tip() {
    let h = Harness::new().await;
    h.chain.push_block(block(70, vec![]));

    let scanner = h.scanner(None);
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    assert_eq!(cursor.height(), 70);

    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert!(report.blocks.is_empty());
}

#[tokio::test]
async fn shutdown_stops_between_blocks() {
    let h = Harness::new().await;
    h.chain.push_block(block(80, vec![]));
    h.chain.push_block(block(81, vec![]));

    let scanner = h.scanner(Some(80));
    let (stop, shutdown) = watch::channel(false);
    stop.send(true).unwrap();

    let mut cursor = scanner.initial_cursor().await.unwrap();
    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert!(report.blocks.is_empty());
    assert_eq!(cursor.height(), 79);

    let stopped = scanner.run(cursor, shutdown).await.unwrap();
    assert_eq!(stopped.height(), 79);
}

#[tokio::test]
async fn run_loop_processes_until_shutdown() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "1").await;
    h.chain
        .push_block(block(90, vec![transfer("0x90", WHALE, Some(EXCHANGE), "4")]));

    let scanner = h.scanner(Some(90));
    let cursor = scanner.initial_cursor().await.unwrap();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(async move { scanner.run(cursor, shutdown).await });

    let dispatcher = h.dispatcher.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.sent().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("alert dispatched");

    stop.send(true).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop stops")
        .unwrap()
        .unwrap();
    assert_eq!(stopped.height(), 90);
}

struct FlakyQuotes {
    calls: AtomicUsize,
}

#[async_trait]
impl QuoteSource for FlakyQuotes {
    async fn fetch(&self, _currency: &str) -> Result<f64, QuoteError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(2_000.0)
        } else {
            Err(QuoteError::Request("rate limited".into()))
        }
    }
}

#[tokio::test]
async fn stale_quote_still_values_transactions() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "100").await;
    let oracle = PriceOracle::new(
        Arc::new(FlakyQuotes {
            calls: AtomicUsize::new(0),
        }),
        h.cache.clone(),
        "usd",
    );
    oracle.refresh().await;
    for _ in 0..3 {
        assert_eq!(oracle.refresh().await.map(|q| q.price), Some(2_000.0));
    }

    h.chain
        .push_block(block(95, vec![transfer("0x95", WHALE, Some(EXCHANGE), "150")]));
    let scanner = h.scanner(Some(95));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();
    scanner.tick(&mut cursor, &shutdown).await.unwrap();

    let tx = h.storage.find_transaction("0x95").await.unwrap().unwrap();
    assert_eq!(tx.value_quote, Some(300_000.0));
    assert_eq!(h.dispatcher.sent().len(), 1);
}

/// SQLite storage whose transaction upsert or dispatch mark can be made to
/// fail once.
#[derive(Clone)]
struct FlakyStorage {
    inner: SeaOrmStorage,
    fail_upsert: Arc<AtomicBool>,
    fail_mark: Arc<AtomicBool>,
}

impl FlakyStorage {
    fn new(inner: SeaOrmStorage) -> Self {
        Self {
            inner,
            fail_upsert: Arc::default(),
            fail_mark: Arc::default(),
        }
    }

    fn trip(flag: &AtomicBool) -> StorageResult<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Database("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for FlakyStorage {
    async fn upsert_transaction(&self, tx: NewTransaction) -> StorageResult<TransactionId> {
        Self::trip(&self.fail_upsert)?;
        self.inner.upsert_transaction(tx).await
    }

    async fn find_transaction(&self, hash: &str) -> StorageResult<Option<TransactionRecord>> {
        self.inner.find_transaction(hash).await
    }

    async fn recent_transactions(&self, limit: u64) -> StorageResult<Vec<TransactionRecord>> {
        self.inner.recent_transactions(limit).await
    }
}

#[async_trait]
impl FeeHistoryStore for FlakyStorage {
    async fn insert_fee_sample(&self, sample: FeeSample) -> StorageResult<()> {
        self.inner.insert_fee_sample(sample).await
    }

    async fn recent_fee_samples(&self, limit: u64) -> StorageResult<Vec<FeeSample>> {
        self.inner.recent_fee_samples(limit).await
    }
}

#[async_trait]
impl WatchlistStore for FlakyStorage {
    async fn watched_addresses(&self) -> StorageResult<Vec<WatchedAddress>> {
        self.inner.watched_addresses().await
    }
}

#[async_trait]
impl DispatchStore for FlakyStorage {
    async fn find_dispatch_record(
        &self,
        owner_id: OwnerId,
        transaction_id: TransactionId,
    ) -> StorageResult<Option<DispatchRecord>> {
        self.inner.find_dispatch_record(owner_id, transaction_id).await
    }

    async fn insert_dispatch_record(&self, record: NewDispatchRecord) -> StorageResult<DispatchId> {
        self.inner.insert_dispatch_record(record).await
    }

    async fn mark_dispatched(&self, id: DispatchId, at: DateTime<Utc>) -> StorageResult<()> {
        Self::trip(&self.fail_mark)?;
        self.inner.mark_dispatched(id, at).await
    }

    async fn release_dispatch_record(&self, id: DispatchId) -> StorageResult<()> {
        self.inner.release_dispatch_record(id).await
    }
}

#[async_trait]
impl CursorStore for FlakyStorage {
    async fn load_cursor(&self) -> StorageResult<Option<u64>> {
        self.inner.load_cursor().await
    }

    async fn store_cursor(&self, height: u64) -> StorageResult<()> {
        self.inner.store_cursor(height).await
    }
}

#[tokio::test]
async fn storage_failure_mid_block_keeps_cursor() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "100").await;
    h.chain
        .push_block(block(20, vec![transfer("0x20aa", WHALE, Some(EXCHANGE), "150")]));

    let storage = FlakyStorage::new(h.storage.clone());
    storage.fail_upsert.store(true, Ordering::SeqCst);
    let scanner = h.scanner_over(storage, Some(20));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();

    let err = scanner.tick(&mut cursor, &shutdown).await.unwrap_err();
    assert!(matches!(err, MonitorError::Storage(StorageError::Database(_))));
    assert_eq!(cursor.height(), 19);
    assert_eq!(h.storage.load_cursor().await.unwrap(), None);
    assert!(h.dispatcher.sent().is_empty());

    scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(cursor.height(), 20);
    assert_eq!(h.storage.load_cursor().await.unwrap(), Some(20));
    assert_eq!(h.dispatcher.hashes(), vec!["0x20aa".to_string()]);
}

#[tokio::test]
async fn lost_dispatch_mark_is_not_resent_on_reprocessing() {
    let h = Harness::new().await;
    h.register("r@example.com", WHALE, "100").await;
    h.chain
        .push_block(block(21, vec![transfer("0x21aa", WHALE, Some(EXCHANGE), "150")]));

    let storage = FlakyStorage::new(h.storage.clone());
    storage.fail_mark.store(true, Ordering::SeqCst);
    let scanner = h.scanner_over(storage, Some(21));
    let (_stop, shutdown) = watch::channel(false);
    let mut cursor = scanner.initial_cursor().await.unwrap();

    assert!(scanner.tick(&mut cursor, &shutdown).await.is_err());
    assert_eq!(h.storage.load_cursor().await.unwrap(), None);
    assert_eq!(h.dispatcher.sent().len(), 1);

    let report = scanner.tick(&mut cursor, &shutdown).await.unwrap();
    assert_eq!(
        report.blocks[0].alerts[0].outcome,
        DispatchOutcome::AlreadyDispatched
    );
    assert_eq!(h.storage.load_cursor().await.unwrap(), Some(21));
    assert_eq!(h.dispatcher.sent().len(), 1);
}

#[test]
fn skipped_blocks_do_not_count_as_processed() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let h = Harness::new().await;
            h.chain.push(80, Err(ChainError::Malformed("bad header".into())));
            h.chain.push_block(block(81, vec![]));

            let scanner = h.scanner(Some(80));
            let (_stop, shutdown) = watch::channel(false);
            let mut cursor = scanner.initial_cursor().await.unwrap();
            scanner.tick(&mut cursor, &shutdown).await.unwrap();
            assert_eq!(cursor.height(), 81);
        })
    });

    let rendered = handle.render();
    assert!(rendered.contains("monitor_blocks_skipped_total 1"), "{rendered}");
    assert!(rendered.contains("monitor_blocks_processed_total 1"), "{rendered}");
}
