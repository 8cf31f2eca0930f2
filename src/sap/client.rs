use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{header, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use super::types::{CreatedDocument, ItemFlagsRow, LoginResponse, ODataList};
use super::{
    BinLocation, BusinessPartner, DocumentSeries, GoodsReceiptDocument, GoodsReceiptResult,
    ItemDetails, ItemValidation, OpenPurchaseOrder, PurchaseOrderDetail, SapError, SapGateway,
};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::SapConfig;

const SESSION_COOKIE: &str = "B1SESSION";
const UNPAGED: &str = "odata.maxpagesize=0";

/// HTTP client for the SAP B1 Service Layer.
///
/// Holds one Service Layer session shared by every request. A 401 drops the
/// session, logs in again and replays the request once.
pub struct ServiceLayerClient {
    http: reqwest::Client,
    config: SapConfig,
    session: RwLock<Option<String>>,
    breaker: CircuitBreaker,
}

impl ServiceLayerClient {
    pub fn new(config: SapConfig, breaker: CircuitBreaker) -> Result<Self, SapError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| SapError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
            breaker,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/b1s/v1/{}",
            self.config.server_url.trim_end_matches('/'),
            path
        )
    }

    #[instrument(skip(self), fields(company_db = %self.config.company_db))]
    async fn login(&self) -> Result<String, SapError> {
        let body = json!({
            "UserName": self.config.username,
            "Password": self.config.password,
            "CompanyDB": self.config.company_db,
        });

        let response = self
            .http
            .post(self.url("Login"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Cannot reach SAP Service Layer at {}: {}", self.config.server_url, e);
                SapError::Transport(e.to_string())
            })?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "SAP login rejected");
            return Err(SapError::LoginFailed(format!("{status}: {text}")));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| SapError::Decode(e.to_string()))?;
        info!("SAP login successful");
        counter!("multi_grn_sap.logins", 1);
        Ok(login.session_id)
    }

    async fn session_id(&self) -> Result<String, SapError> {
        if let Some(id) = self.session.read().await.as_ref() {
            return Ok(id.clone());
        }

        let mut guard = self.session.write().await;
        // Another request may have logged in while we waited for the lock.
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }
        let id = self.login().await?;
        *guard = Some(id.clone());
        Ok(id)
    }

    async fn clear_session(&self) {
        *self.session.write().await = None;
    }

    /// Sends a request through the breaker, re-authenticating once on 401.
    async fn send<F>(&self, endpoint: &'static str, build: F) -> Result<Response, SapError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        if !self.config.is_configured() {
            return Err(SapError::NotConfigured);
        }
        if let Err(open) = self.breaker.admit() {
            debug!(endpoint, %open, "SAP call rejected locally");
            counter!("multi_grn_sap.rejected", 1, "endpoint" => endpoint);
            return Err(SapError::CircuitOpen);
        }

        let started = Instant::now();
        let result = self.send_with_session(&build).await;
        histogram!(
            "multi_grn_sap.request_duration_seconds",
            started.elapsed().as_secs_f64(),
            "endpoint" => endpoint
        );

        match &result {
            Ok(response) if response.status().is_server_error() => {
                self.breaker.record_failure();
                counter!("multi_grn_sap.requests", 1, "endpoint" => endpoint, "outcome" => "server_error");
            }
            Ok(_) => {
                self.breaker.record_success();
                counter!("multi_grn_sap.requests", 1, "endpoint" => endpoint, "outcome" => "ok");
            }
            Err(e) if e.is_outage() => {
                self.breaker.record_failure();
                counter!("multi_grn_sap.requests", 1, "endpoint" => endpoint, "outcome" => "unreachable");
            }
            Err(_) => {
                counter!("multi_grn_sap.requests", 1, "endpoint" => endpoint, "outcome" => "error");
            }
        }

        result
    }

    async fn send_with_session<F>(&self, build: &F) -> Result<Response, SapError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        for attempt in 0..2 {
            let session = self.session_id().await?;
            let response = build(&self.http)
                .header(header::COOKIE, format!("{SESSION_COOKIE}={session}"))
                .send()
                .await
                .map_err(|e| SapError::Transport(e.to_string()))?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            debug!(attempt, "SAP session expired");
            self.clear_session().await;
        }

        Err(SapError::Unauthorized)
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
        expected: StatusCode,
    ) -> Result<T, SapError> {
        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            return Err(SapError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SapError::Decode(e.to_string()))
    }

    fn posting_timeout(&self) -> Duration {
        self.config.posting_timeout()
    }
}

/// OData string literals escape a single quote by doubling it
fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl SapGateway for ServiceLayerClient {
    #[instrument(skip(self, document), fields(card_code = %document.card_code, num_at_card = %document.num_at_card))]
    async fn post_goods_receipt(
        &self,
        document: &GoodsReceiptDocument,
    ) -> Result<GoodsReceiptResult, SapError> {
        let url = self.url("PurchaseDeliveryNotes");
        let timeout = self.posting_timeout();
        let response = self
            .send("purchase_delivery_notes", |http| {
                http.post(url.as_str()).json(document).timeout(timeout)
            })
            .await?;

        let created: CreatedDocument = Self::read_json(response, StatusCode::CREATED)
            .await
            .map_err(|e| {
                error!("Failed to create GRN: {}", e);
                e
            })?;

        info!(
            doc_num = %created.doc_num,
            doc_entry = created.doc_entry,
            "GRN created in SAP"
        );
        Ok(GoodsReceiptResult {
            doc_entry: created.doc_entry,
            doc_num: created.doc_num,
        })
    }

    #[instrument(skip(self))]
    async fn validate_item(&self, item_code: &str) -> Result<ItemValidation, SapError> {
        let url = self.url("SQLQueries('ItemCode_Batch_Serial_Val')/List");
        let body = json!({ "ParamList": format!("itemCode='{}'", quote(item_code)) });
        let response = self
            .send("item_validation", |http| http.post(url.as_str()).json(&body))
            .await?;

        let rows: ODataList<ItemFlagsRow> = Self::read_json(response, StatusCode::OK).await?;
        let row = rows
            .value
            .into_iter()
            .next()
            .ok_or_else(|| SapError::ItemNotFound(item_code.to_string()))?;

        let flag = |v: &Option<String>| v.as_deref() == Some("Y");
        let validation = ItemValidation::from_flags(
            row.item_code.clone().unwrap_or_else(|| item_code.to_string()),
            flag(&row.batch_num),
            flag(&row.serial_num),
            row.method.clone().unwrap_or_else(|| "N".to_string()),
        );
        debug!(inventory_type = %validation.inventory_type, "Item validated");
        Ok(validation)
    }

    #[instrument(skip(self))]
    async fn item_details(&self, item_code: &str) -> Result<ItemDetails, SapError> {
        let url = self.url(&format!("Items('{}')", quote(item_code)));
        let response = self
            .send("items", |http| {
                http.get(url.as_str()).query(&[(
                    "$select",
                    "ItemCode,ItemName,InventoryUOM,PurchaseUnit,QuantityOnStock",
                )])
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SapError::ItemNotFound(item_code.to_string()));
        }
        Self::read_json(response, StatusCode::OK).await
    }

    #[instrument(skip(self))]
    async fn document_series(&self) -> Result<Vec<DocumentSeries>, SapError> {
        let url = self.url("SQLQueries('Get_PO_Series')/List");
        let body = json!({});
        let response = self
            .send("document_series", |http| http.post(url.as_str()).json(&body))
            .await?;
        let list: ODataList<DocumentSeries> = Self::read_json(response, StatusCode::OK).await?;
        Ok(list.value)
    }

    #[instrument(skip(self))]
    async fn open_purchase_orders(
        &self,
        series_id: &str,
        card_code: &str,
    ) -> Result<Vec<OpenPurchaseOrder>, SapError> {
        let url = self.url("SQLQueries('Get_Multi_Open_PO_DocNum')/List");
        let body = json!({
            "ParamList": format!("SeriesID='{}'&cardCode='{}'", quote(series_id), quote(card_code))
        });
        let response = self
            .send("open_purchase_orders", |http| {
                http.post(url.as_str()).json(&body)
            })
            .await?;
        let list: ODataList<OpenPurchaseOrder> =
            Self::read_json(response, StatusCode::OK).await?;
        info!(count = list.value.len(), "Fetched open purchase orders");
        Ok(list.value)
    }

    #[instrument(skip(self))]
    async fn purchase_order(&self, doc_entry: i32) -> Result<PurchaseOrderDetail, SapError> {
        let url = self.url(&format!("PurchaseOrders({doc_entry})"));
        let response = self
            .send("purchase_orders", |http| {
                http.get(url.as_str()).query(&[(
                    "$select",
                    "DocEntry,DocNum,CardCode,CardName,DocumentLines",
                )])
            })
            .await?;
        Self::read_json(response, StatusCode::OK).await
    }

    #[instrument(skip(self))]
    async fn business_partners(&self) -> Result<Vec<BusinessPartner>, SapError> {
        let url = self.url("BusinessPartners");
        let response = self
            .send("business_partners", |http| {
                http.get(url.as_str())
                    .query(&[
                        ("$filter", "Valid eq 'tYES'"),
                        ("$select", "CardCode,CardName,CardType"),
                    ])
                    .header("Prefer", UNPAGED)
            })
            .await?;
        let list: ODataList<BusinessPartner> = Self::read_json(response, StatusCode::OK).await?;
        Ok(list.value)
    }

    #[instrument(skip(self))]
    async fn card_codes_by_series(&self, series_id: i32) -> Result<Vec<BusinessPartner>, SapError> {
        let url = self.url("PurchaseOrders");
        let filter = format!("Series eq {series_id} and DocumentStatus eq 'bost_Open'");
        let response = self
            .send("card_codes_by_series", |http| {
                http.get(url.as_str())
                    .query(&[
                        ("$filter", filter.as_str()),
                        ("$select", "CardCode,CardName"),
                        ("$orderby", "CardCode"),
                    ])
                    .header("Prefer", UNPAGED)
            })
            .await?;
        let list: ODataList<BusinessPartner> = Self::read_json(response, StatusCode::OK).await?;
        let partners = BusinessPartner::distinct(list.value);
        info!(series_id, count = partners.len(), "Fetched vendors for series");
        Ok(partners)
    }

    #[instrument(skip(self))]
    async fn bin_locations(&self, warehouse_code: &str) -> Result<Vec<BinLocation>, SapError> {
        let url = self.url("BinLocations");
        let filter = format!("Warehouse eq '{}'", quote(warehouse_code));
        let response = self
            .send("bin_locations", |http| {
                http.get(url.as_str())
                    .query(&[
                        ("$filter", filter.as_str()),
                        ("$select", "AbsEntry,BinCode,Warehouse"),
                    ])
                    .header("Prefer", UNPAGED)
            })
            .await?;
        let list: ODataList<BinLocation> = Self::read_json(response, StatusCode::OK).await?;
        Ok(list.value)
    }
}
