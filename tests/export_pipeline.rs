// End-to-end export: on-disk KV store + fake indexed search
use chrono::{DateTime, TimeZone, Utc};
use cintara_taxbit::address::encode_bech32;
use cintara_taxbit::normalizer::hash_key;
use cintara_taxbit::rpc::{RpcEvent, RpcTx, TxSearchPage};
use cintara_taxbit::store::{put_record, setup_kv_table};
use cintara_taxbit::{
    BlockTimeLookup, ExportPipeline, ExportRequest, KvScanStrategy, PipelineConfig, RpcError,
    RpcSearchStrategy, ScanLimits, TokenRegistry, TxSearchClient, WalletAddress, HEADER,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

const WALLET: &str = "0x400d4a7c9df0b8f438e819b91f7d76b4ed27ce1c";
const COUNTERPARTY: &str = "676944eb6ba099d99b7d73d9a20427740e04e3d4";

fn wallet() -> WalletAddress {
    WalletAddress::parse(WALLET).unwrap()
}

/// Protobuf-ish value: from wallet, to counterparty, little-endian amount
fn kv_value(amount: u128) -> Vec<u8> {
    let mut value = b"\x0a\x1f/ethermint.evm.v1.MsgEthereumTx\x12\x40".to_vec();
    while value.len() % 8 != 0 {
        value.push(0);
    }
    value.extend_from_slice(&[0u8; 6]);
    value.extend_from_slice(&[0x0a, 0x14]);
    value.extend_from_slice(wallet().bytes());
    value.extend_from_slice(&[0x12, 0x14]);
    value.extend_from_slice(&hex::decode(COUNTERPARTY).unwrap());
    while value.len() % 8 != 0 {
        value.push(0);
    }
    value.extend_from_slice(&amount.to_le_bytes());
    value
}

fn write_store(path: &Path) {
    let conn = Connection::open(path).unwrap();
    setup_kv_table(&conn).unwrap();
    put_record(&conn, b"evm/tx/height/100/aa", &kv_value(20_000_000_000_000_000_000)).unwrap();
    put_record(&conn, b"evm/tx/height/200/bb", &kv_value(1_500_000_000_000_000_000)).unwrap();
    put_record(&conn, b"meta/version", b"v1").unwrap();
}

struct FakeNode;

impl FakeNode {
    fn chain_address() -> String {
        encode_bech32("cintara", wallet().bytes()).unwrap()
    }
}

impl TxSearchClient for FakeNode {
    fn tx_search(&self, query: &str, page: u32, _per_page: u32) -> Result<TxSearchPage, RpcError> {
        if page > 1 || !query.starts_with("message.sender") {
            return Ok(TxSearchPage::default());
        }

        // Same record the KV scan finds under key ".../aa", decoded properly
        let duplicate = hash_key(b"evm/tx/height/100/aa");
        let me = Self::chain_address();
        let txs = vec![
            RpcTx {
                hash: duplicate.trim_start_matches("0x").to_uppercase(),
                height: 100,
                code: 0,
                events: vec![
                    RpcEvent::new("message", &[("action", "/cosmos.bank.v1beta1.MsgSend"), ("sender", me.as_str())]),
                    RpcEvent::new(
                        "transfer",
                        &[("sender", me.as_str()), ("recipient", "cintara1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5ynmgsd"), ("amount", "20000000000000000000actr")],
                    ),
                    RpcEvent::new("tx", &[("fee", "4000000000000000actr"), ("memo", "from node")]),
                ],
                timestamp: None,
            },
            RpcTx {
                hash: "C0FFEE".to_string(),
                height: 300,
                code: 0,
                events: vec![
                    RpcEvent::new("message", &[("action", "/cosmos.staking.v1beta1.MsgDelegate"), ("sender", me.as_str())]),
                    RpcEvent::new("delegate", &[("validator", "cintaravaloper1xyz"), ("amount", "7000000uctr")]),
                ],
                timestamp: None,
            },
        ];

        Ok(TxSearchPage { total_count: txs.len() as u64, txs })
    }
}

impl BlockTimeLookup for FakeNode {
    fn block_time(&self, height: u64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(1_704_067_200 + (height as i64) * 86_400, 0).single()
    }
}

fn pipeline(store: &Path) -> ExportPipeline {
    let node = Arc::new(FakeNode);
    let rpc = RpcSearchStrategy::new(node.clone(), 50, 10).with_block_lookup(node.clone());
    let kv = KvScanStrategy::sqlite(store, ScanLimits::default()).with_block_lookup(node);

    ExportPipeline::new(
        &PipelineConfig::default(),
        Arc::new(TokenRegistry::with_defaults()),
        vec![Box::new(rpc), Box::new(kv)],
    )
}

fn rows(csv: &str) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn test_full_export_merges_strategies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.db");
    write_store(&path);

    let report = pipeline(&path).export(&ExportRequest::new(WALLET)).unwrap();
    assert!(!report.truncated);
    assert_eq!(report.rows, 3);

    let header = report.csv.lines().next().unwrap();
    assert_eq!(header, HEADER.join(","));

    let rows = rows(&report.csv);
    let txids: HashSet<&str> = rows.iter().map(|r| r[1].as_str()).collect();
    assert_eq!(txids.len(), rows.len());

    // Newest first: height 300, 200, 100
    assert_eq!(rows[0][1], "0xc0ffee");
    assert_eq!(rows[0][5], "Outbound > Staking Deposit");

    // Height 200 only exists in the KV store
    assert_eq!(rows[1][0], "2024-07-19T00:00:00Z");
    assert_eq!(rows[1][4], format!("0x{}", COUNTERPARTY));
    assert_eq!(rows[1][10], "CTR");
    assert_eq!(rows[1][11], "1.5");

    // Height 100 was found by both; the indexed record wins
    assert_eq!(rows[2][1], hash_key(b"evm/tx/height/100/aa"));
    assert_eq!(rows[2][18], "from node");
    assert_eq!(rows[2][11], "20");
    assert_eq!(rows[2][14], "CTR");
    assert_eq!(rows[2][15], "0.004");
    assert_eq!(rows[2][19], "Completed");
}

#[test]
fn test_export_idempotent_and_date_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.db");
    write_store(&path);
    let pipeline = pipeline(&path);

    let request = ExportRequest::new(WALLET).between(Some("2024-04-01"), Some("2024-07-19"));
    let first = pipeline.export(&request).unwrap();
    let second = pipeline.export(&request).unwrap();

    assert_eq!(first.csv, second.csv);
    assert_eq!(first.rows, 2);
    for row in rows(&first.csv) {
        assert!(row[0].as_str() >= "2024-04-01" && row[0].as_str() <= "2024-07-19T23:59:59Z");
    }
}

#[test]
fn test_missing_store_degrades_to_rpc_only() {
    let dir = tempfile::tempdir().unwrap();
    let report = pipeline(&dir.path().join("missing.db"))
        .export(&ExportRequest::new(FakeNode::chain_address()))
        .unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(report.strategies.len(), 2);
    assert_eq!(report.strategies[1].found, 0);
    assert_eq!(report.strategies[1].errors.len(), 1);
}
