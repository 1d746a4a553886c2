//! Repository backed by a hosted database's `PostgREST` endpoint.
//!
//! Rows are exchanged as JSON with the same field names as the model types.
//! Change notifications are published for writes made through this store;
//! the hosted realtime feed is not consumed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{publish, Change, Repository, CHANGE_CHANNEL_CAPACITY};
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryKind};
use crate::model::{LogPatch, NewTripLog, NewVehicle, TripLog, Vehicle, VehiclePatch};

const VEHICLES: &str = "vehicles";
const LOGS: &str = "logs";
const HISTORY: &str = "history_entries";

#[derive(Debug, Serialize)]
struct NewHistoryRow<'a> {
    kind: HistoryKind,
    value: &'a str,
}

/// A [`Repository`] speaking the `PostgREST` protocol.
#[derive(Debug)]
pub struct RestStore {
    client: Client,
    base: Url,
    api_key: String,
    changes: broadcast::Sender<Change>,
}

impl RestStore {
    /// Create a store for the project at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url.trim_end_matches('/'))
            .map_err(|_| Error::invalid_input("store url", url))?;
        let client = Client::builder().timeout(timeout).build()?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            base,
            api_key: api_key.into(),
            changes,
        })
    }

    /// Endpoint URL for `table`.
    #[must_use]
    pub fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{table}",
            self.base.as_str().trim_end_matches('/')
        )
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn returning(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, table)
            .header("Prefer", "return=representation")
    }

    async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>> {
        Ok(response.error_for_status()?.json().await?)
    }

    async fn single<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::remote(format!("{what}: no row returned")))
    }
}

/// Decode each row on its own, skipping rows that do not parse.
fn decode_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping unreadable {} row: {}", what, e);
                None
            }
        })
        .collect()
}

fn id_filter(id: i64) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

#[async_trait]
impl Repository for RestStore {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        let response = self
            .request(Method::GET, VEHICLES)
            .query(&[("select", "*"), ("order", "id.asc")])
            .send()
            .await?;
        let vehicles: Vec<Vehicle> = decode_rows(Self::rows(response).await?, "vehicle");
        debug!("Fetched {} vehicles", vehicles.len());
        Ok(vehicles)
    }

    async fn list_logs(&self) -> Result<Vec<TripLog>> {
        let response = self
            .request(Method::GET, LOGS)
            .query(&[("select", "*"), ("order", "id.desc")])
            .send()
            .await?;
        let logs: Vec<TripLog> = decode_rows(Self::rows(response).await?, "trip log");
        debug!("Fetched {} trip logs", logs.len());
        Ok(logs)
    }

    async fn insert_vehicle(&self, vehicle: &NewVehicle) -> Result<Vehicle> {
        let response = self
            .returning(Method::POST, VEHICLES)
            .json(vehicle)
            .send()
            .await?;
        let stored: Vehicle = Self::single(response, "insert vehicle").await?;
        publish(&self.changes, Change::VehicleInserted(stored.clone()));
        Ok(stored)
    }

    async fn update_vehicle(&self, id: i64, patch: &VehiclePatch) -> Result<Vehicle> {
        let response = self
            .returning(Method::PATCH, VEHICLES)
            .query(&id_filter(id))
            .json(patch)
            .send()
            .await?;
        let stored: Vehicle = Self::single(response, "update vehicle").await?;
        publish(&self.changes, Change::VehicleUpdated(stored.clone()));
        Ok(stored)
    }

    async fn delete_vehicle(&self, id: i64) -> Result<()> {
        self.request(Method::DELETE, VEHICLES)
            .query(&id_filter(id))
            .send()
            .await?
            .error_for_status()?;
        publish(&self.changes, Change::VehicleDeleted(id));
        Ok(())
    }

    async fn insert_log(&self, log: &NewTripLog) -> Result<TripLog> {
        let response = self
            .returning(Method::POST, LOGS)
            .json(log)
            .send()
            .await?;
        let stored: TripLog = Self::single(response, "insert log").await?;
        publish(&self.changes, Change::LogInserted(stored.clone()));
        Ok(stored)
    }

    async fn update_log(&self, id: i64, patch: &LogPatch) -> Result<TripLog> {
        let response = self
            .returning(Method::PATCH, LOGS)
            .query(&id_filter(id))
            .json(patch)
            .send()
            .await?;
        let stored: TripLog = Self::single(response, "update log").await?;
        publish(&self.changes, Change::LogUpdated(stored.clone()));
        Ok(stored)
    }

    async fn delete_log(&self, id: i64) -> Result<()> {
        self.request(Method::DELETE, LOGS)
            .query(&id_filter(id))
            .send()
            .await?
            .error_for_status()?;
        publish(&self.changes, Change::LogDeleted(id));
        Ok(())
    }

    async fn insert_history(&self, kind: HistoryKind, value: &str) -> Result<()> {
        self.request(Method::POST, HISTORY)
            .header("Prefer", "return=minimal")
            .json(&NewHistoryRow { kind, value })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let response = self
            .request(Method::GET, HISTORY)
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        Self::rows(response).await
    }

    fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> RestStore {
        RestStore::new(url, "anon-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_table_url() {
        let store = store("https://abc.supabase.co");
        assert_eq!(
            store.table_url("vehicles"),
            "https://abc.supabase.co/rest/v1/vehicles"
        );
    }

    #[test]
    fn test_table_url_strips_trailing_slash() {
        let store = store("https://abc.supabase.co/");
        assert_eq!(store.table_url("logs"), "https://abc.supabase.co/rest/v1/logs");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = RestStore::new("not a url", "k", Duration::from_secs(5)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_id_filter() {
        assert_eq!(id_filter(12), [("id", "eq.12".to_string())]);
    }

    #[test]
    fn test_history_row_body() {
        let row = NewHistoryRow {
            kind: HistoryKind::Driver,
            value: "Kim",
        };
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"kind":"driver","value":"Kim"}"#
        );
    }

    fn log_row(id: i64, out_time: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "vehicle_id": 5,
            "plate": "170허8466",
            "model": "K5",
            "driver": "Kim",
            "purpose": "Meeting",
            "out_time": out_time,
            "in_time": null,
            "status": "ongoing",
            "project_id": "green",
        })
    }

    #[test]
    fn test_decode_rows_reads_korean_locale_times() {
        let logs: Vec<TripLog> = decode_rows(
            vec![
                log_row(1, "2024-01-05 10:00"),
                log_row(2, "2024. 1. 5. 오후 03:10"),
            ],
            "trip log",
        );
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].out_time.to_string(), "2024-01-05 15:10");
    }

    #[test]
    fn test_decode_rows_skips_unreadable_row() {
        let logs: Vec<TripLog> = decode_rows(
            vec![log_row(1, "2024-01-05 10:00"), log_row(2, "sometime")],
            "trip log",
        );
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, 1);
    }

    #[test]
    fn test_name() {
        assert_eq!(store("http://localhost:54321").name(), "postgrest");
    }
}
