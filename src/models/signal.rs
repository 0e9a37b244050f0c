//! Radio readings as they arrive from clients and as they are forwarded to
//! estimation and inquiry peers.

use serde::{Deserialize, Serialize};

use crate::error::{PresenceError, PresenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Wifi,
    Ble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalReading {
    pub kind: SignalKind,
    pub identifier: String,
    pub rssi: i32,
}

impl SignalReading {
    /// Rows look like `[ssid_or_timestamp, bssid_or_uuid, rssi, ...]`.
    /// Returns `None` for anything short, blank or non-numeric.
    pub fn from_row(kind: SignalKind, row: &[String]) -> Option<Self> {
        if row.len() < 3 {
            return None;
        }
        let identifier = row[1].trim();
        if identifier.is_empty() {
            return None;
        }
        let rssi = parse_rssi(row[2].trim())?;
        Some(Self {
            kind,
            identifier: identifier.to_string(),
            rssi,
        })
    }
}

fn parse_rssi(raw: &str) -> Option<i32> {
    if let Ok(value) = raw.parse::<i32>() {
        return Some(value);
    }
    // Some scanners report "-61.0".
    let value = raw.parse::<f64>().ok()?;
    if !value.is_finite() || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return None;
    }
    Some(value.round() as i32)
}

/// One submission: the WiFi and BLE record sets exactly as parsed from CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalPayload {
    pub wifi_rows: Vec<Vec<String>>,
    pub ble_rows: Vec<Vec<String>>,
}

impl SignalPayload {
    pub fn new(wifi_rows: Vec<Vec<String>>, ble_rows: Vec<Vec<String>>) -> Self {
        Self {
            wifi_rows,
            ble_rows,
        }
    }

    pub fn from_csv(wifi_csv: &str, ble_csv: &str) -> PresenceResult<Self> {
        Ok(Self {
            wifi_rows: parse_csv(wifi_csv, "wifi_data")?,
            ble_rows: parse_csv(ble_csv, "ble_data")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.wifi_rows.is_empty() && self.ble_rows.is_empty()
    }

    pub fn wifi_readings(&self) -> Vec<SignalReading> {
        readings(SignalKind::Wifi, &self.wifi_rows)
    }

    pub fn ble_readings(&self) -> Vec<SignalReading> {
        readings(SignalKind::Ble, &self.ble_rows)
    }

    /// BLE first, then WiFi.
    pub fn all_readings(&self) -> Vec<SignalReading> {
        let mut all = self.ble_readings();
        all.extend(self.wifi_readings());
        all
    }

    pub fn wifi_csv(&self) -> PresenceResult<String> {
        write_csv(&self.wifi_rows)
    }

    pub fn ble_csv(&self) -> PresenceResult<String> {
        write_csv(&self.ble_rows)
    }

    /// Single file for the estimation peer: BLE rows followed by WiFi rows.
    pub fn combined_csv(&self) -> PresenceResult<String> {
        let mut rows = self.ble_rows.clone();
        rows.extend(self.wifi_rows.iter().cloned());
        write_csv(&rows)
    }
}

fn readings(kind: SignalKind, rows: &[Vec<String>]) -> Vec<SignalReading> {
    rows.iter()
        .filter_map(|row| SignalReading::from_row(kind, row))
        .collect()
}

fn parse_csv(text: &str, field: &str) -> PresenceResult<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|err| PresenceError::validation(format!("{field} is not valid CSV: {err}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn write_csv(rows: &[Vec<String>]) -> PresenceResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|err| PresenceError::validation(format!("failed to encode CSV: {err}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| PresenceError::validation(format!("failed to flush CSV: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| PresenceError::validation(format!("CSV is not UTF-8: {err}")))
}
