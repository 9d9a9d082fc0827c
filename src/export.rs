// 📤 CSV Exporter - fixed 20-column TaxBit schema
//
// Rows are built only here, from merged, classified transactions. The header is
// always written, so an empty export is exactly one line.

use crate::amount::convert_base_units;
use crate::classifier::{Category, Direction};
use crate::error::ExportResult;
use crate::normalizer::NormalizedTransaction;
use crate::tokens::TokenRegistry;
use serde::Serialize;

/// Column order of the TaxBit import format
pub const HEADER: [&str; 20] = [
    "timestamp",
    "txid",
    "source_name",
    "from_wallet_address",
    "to_wallet_address",
    "category",
    "in_currency",
    "in_amount",
    "in_currency_fiat",
    "in_amount_fiat",
    "out_currency",
    "out_amount",
    "out_currency_fiat",
    "out_amount_fiat",
    "fee_currency",
    "fee",
    "fee_currency_fiat",
    "fee_fiat",
    "memo",
    "status",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ============================================================================
// ROW
// ============================================================================

/// One output line. Field order matches `HEADER`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxBitRow {
    pub timestamp: String,
    pub txid: String,
    pub source_name: String,
    pub from_wallet_address: String,
    pub to_wallet_address: String,
    pub category: String,
    pub in_currency: String,
    pub in_amount: String,
    pub in_currency_fiat: String,
    pub in_amount_fiat: String,
    pub out_currency: String,
    pub out_amount: String,
    pub out_currency_fiat: String,
    pub out_amount_fiat: String,
    pub fee_currency: String,
    pub fee: String,
    pub fee_currency_fiat: String,
    pub fee_fiat: String,
    pub memo: String,
    pub status: String,
}

/// Settings that shape every row of an export
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Value of the `source_name` column
    pub source_name: String,

    /// Denom fees are charged in
    pub native_denom: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            source_name: "Cintara".to_string(),
            native_denom: "actr".to_string(),
        }
    }
}

// ============================================================================
// EXPORTER
// ============================================================================

pub struct CsvExporter<'a> {
    registry: &'a TokenRegistry,
    options: &'a ExportOptions,
}

impl<'a> CsvExporter<'a> {
    pub fn new(registry: &'a TokenRegistry, options: &'a ExportOptions) -> Self {
        CsvExporter { registry, options }
    }

    /// Build the row for one classified transaction
    pub fn build_row(&self, tx: &NormalizedTransaction, category: Category) -> TaxBitRow {
        let mut row = TaxBitRow {
            timestamp: tx.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            txid: tx.hash.clone(),
            source_name: self.options.source_name.clone(),
            from_wallet_address: tx.from_address.clone(),
            to_wallet_address: tx.to_address.clone(),
            category: category.label().to_string(),
            memo: tx.memo.clone(),
            status: if tx.success { "Completed" } else { "Failed" }.to_string(),
            ..TaxBitRow::default()
        };

        let (currency, amount) = self.render(tx.amount, &tx.denom);
        match category.direction() {
            Direction::Inbound => {
                row.in_currency = currency;
                row.in_amount = amount;
            }
            Direction::Outbound => {
                row.out_currency = currency;
                row.out_amount = amount;
            }
            Direction::Both => {
                row.out_currency = currency;
                row.out_amount = amount;
                if let Some(counter) = tx.counter_amount {
                    let denom = tx.counter_denom.as_deref().unwrap_or(&tx.denom);
                    let (in_currency, in_amount) = self.render(counter, denom);
                    row.in_currency = in_currency;
                    row.in_amount = in_amount;
                }
            }
        }

        if tx.fee > 0 {
            let (fee_currency, fee) = self.render(tx.fee, &self.options.native_denom);
            row.fee_currency = fee_currency;
            row.fee = fee;
        }

        row
    }

    /// (currency, amount) for the CSV
    fn render(&self, value: u128, denom: &str) -> (String, String) {
        let (display, symbol) = convert_base_units(value, denom, self.registry);
        (symbol, display.to_string())
    }

    /// Full CSV text for classified transactions, header first
    pub fn export(&self, transactions: &[(NormalizedTransaction, Category)]) -> ExportResult<String> {
        let rows: Vec<TaxBitRow> = transactions
            .iter()
            .map(|(tx, category)| self.build_row(tx, *category))
            .collect();
        write_csv(&rows)
    }
}

/// Serialize rows with the fixed header
pub fn write_csv(rows: &[TaxBitRow]) -> ExportResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

// ============================================================================
// TESTS
// ============================================================================
