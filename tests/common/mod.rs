#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use multi_grn_api::{
    app_router,
    auth::{AuthConfig, AuthService, PERM_MULTIPLE_GRN, PERM_QC_DASHBOARD, ROLE_ADMIN, ROLE_QC},
    circuit_breaker::CircuitBreaker,
    config::AppConfig,
    db,
    entities::grn::InventoryType,
    health::HealthState,
    sap::{
        BinLocation, BusinessPartner, DocumentSeries, GoodsReceiptDocument, GoodsReceiptResult,
        ItemDetails, ItemValidation, OpenPurchaseOrder, PurchaseOrderDetail, SapError, SapGateway,
    },
    services::{ServiceContainer, ServiceFactory},
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const CLERK: &str = "clerk-1";
pub const OTHER_CLERK: &str = "clerk-2";
pub const REVIEWER: &str = "qc-1";
pub const ADMIN: &str = "admin-1";

/// In-process stand-in for the SAP Service Layer.
///
/// Goods receipts succeed unless their PO `DocEntry` is in `failing`; every
/// submitted document is kept for inspection.
#[derive(Default)]
pub struct FakeSap {
    pub failing: Mutex<HashSet<i32>>,
    pub posted: Mutex<Vec<GoodsReceiptDocument>>,
    pub unknown_items: Mutex<HashSet<String>>,
    next_entry: AtomicI32,
}

impl FakeSap {
    pub fn fail_po(&self, doc_entry: i32) {
        self.failing.lock().unwrap().insert(doc_entry);
    }

    pub fn recover_po(&self, doc_entry: i32) {
        self.failing.lock().unwrap().remove(&doc_entry);
    }

    pub fn posted_documents(&self) -> Vec<GoodsReceiptDocument> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SapGateway for FakeSap {
    async fn post_goods_receipt(
        &self,
        document: &GoodsReceiptDocument,
    ) -> Result<GoodsReceiptResult, SapError> {
        let base_entry = document
            .document_lines
            .iter()
            .find_map(|l| l.base_entry)
            .unwrap_or_default();
        if self.failing.lock().unwrap().contains(&base_entry) {
            return Err(SapError::Http {
                status: 400,
                body: format!("Document {base_entry} is locked"),
            });
        }

        self.posted.lock().unwrap().push(document.clone());
        let n = self.next_entry.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GoodsReceiptResult {
            doc_entry: 9000 + n,
            doc_num: format!("{}", 7000 + n),
        })
    }

    async fn validate_item(&self, item_code: &str) -> Result<ItemValidation, SapError> {
        if self.unknown_items.lock().unwrap().contains(item_code) {
            return Err(SapError::ItemNotFound(item_code.to_string()));
        }
        let (batch, serial) = match item_code.chars().next() {
            Some('B') => (true, false),
            Some('S') => (false, true),
            _ => (false, false),
        };
        Ok(ItemValidation::from_flags(
            item_code.to_string(),
            batch,
            serial,
            "A".to_string(),
        ))
    }

    async fn item_details(&self, item_code: &str) -> Result<ItemDetails, SapError> {
        Ok(ItemDetails {
            item_code: item_code.to_string(),
            item_name: Some(format!("Item {item_code}")),
            inventory_uom: Some("KG".to_string()),
            purchase_unit: None,
            quantity_on_stock: None,
        })
    }

    async fn document_series(&self) -> Result<Vec<DocumentSeries>, SapError> {
        Ok(vec![DocumentSeries {
            series_id: "101".to_string(),
            series_name: Some("PO-2024".to_string()),
        }])
    }

    async fn open_purchase_orders(
        &self,
        _series_id: &str,
        card_code: &str,
    ) -> Result<Vec<OpenPurchaseOrder>, SapError> {
        Ok((1..=3)
            .map(|i| OpenPurchaseOrder {
                doc_entry: 100 + i,
                doc_num: format!("450{i}"),
                card_code: Some(card_code.to_string()),
                card_name: Some("Acme Supplies".to_string()),
                doc_date: Some("20240115".to_string()),
                doc_total: Some(1000.0),
            })
            .collect())
    }

    async fn purchase_order(&self, doc_entry: i32) -> Result<PurchaseOrderDetail, SapError> {
        Err(SapError::Http {
            status: 404,
            body: format!("PO {doc_entry} not stubbed"),
        })
    }

    async fn business_partners(&self) -> Result<Vec<BusinessPartner>, SapError> {
        Ok(vec![BusinessPartner {
            card_code: "V-ACME".to_string(),
            card_name: Some("Acme Supplies".to_string()),
            card_type: Some("cSupplier".to_string()),
        }])
    }

    async fn card_codes_by_series(&self, series_id: i32) -> Result<Vec<BusinessPartner>, SapError> {
        if series_id != 101 {
            return Ok(Vec::new());
        }
        Ok(vec![BusinessPartner {
            card_code: "V-ACME".to_string(),
            card_name: Some("Acme Supplies".to_string()),
            card_type: None,
        }])
    }

    async fn bin_locations(&self, warehouse_code: &str) -> Result<Vec<BinLocation>, SapError> {
        Ok(vec![BinLocation {
            abs_entry: 1,
            bin_code: format!("{warehouse_code}-A1"),
            warehouse: Some(warehouse_code.to_string()),
        }])
    }
}

/// Application over a throwaway SQLite file and a [`FakeSap`].
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub sap: Arc<FakeSap>,
    auth: Arc<AuthService>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("multi_grn_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.sap.default_warehouse = "WH-MAIN".to_string();
        cfg.sap.branch_id = 3;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let sap = Arc::new(FakeSap::default());
        let gateway: Arc<dyn SapGateway> = sap.clone();
        let auth = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(600),
        )));

        let cfg = Arc::new(cfg);
        let factory = ServiceFactory::new(db_arc.clone(), gateway, cfg.clone());
        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            services: ServiceContainer::new(&factory),
            auth: auth.clone(),
        };
        let health = Arc::new(HealthState::new(
            db_arc,
            true,
            CircuitBreaker::new(5, Duration::from_secs(60), 1),
        ));

        Self {
            router: app_router(state.clone(), health),
            state,
            sap,
            auth,
            _dir: dir,
        }
    }

    pub fn token(&self, user_id: &str, roles: &[&str], permissions: &[&str]) -> String {
        self.auth
            .issue_token(user_id, None, roles, permissions)
            .expect("issue token")
    }

    pub fn clerk_token(&self) -> String {
        self.token(CLERK, &[], &[PERM_MULTIPLE_GRN])
    }

    pub fn other_clerk_token(&self) -> String {
        self.token(OTHER_CLERK, &[], &[PERM_MULTIPLE_GRN])
    }

    pub fn reviewer_token(&self) -> String {
        self.token(REVIEWER, &[ROLE_QC], &[PERM_QC_DASHBOARD])
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN, &[ROLE_ADMIN], &[])
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("failed to build request"))
            .await
            .expect("router error during test request")
    }

    /// Creates a batch for `V-ACME` and returns its id
    pub async fn create_batch(&self, token: &str) -> i64 {
        let response = self
            .request(
                Method::POST,
                "/api/v1/grn/batches",
                Some(json!({
                    "customer_code": "V-ACME",
                    "customer_name": "Acme Supplies",
                    "doc_series_id": "101",
                    "doc_series_name": "PO-2024"
                })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), 201, "batch creation failed");
        response_json(response).await["data"]["id"]
            .as_i64()
            .expect("batch id")
    }

    /// Links POs by DocEntry and returns the link ids in the same order
    pub async fn link_pos(&self, token: &str, batch_id: i64, doc_entries: &[i32]) -> Vec<i64> {
        let pos: Vec<Value> = doc_entries
            .iter()
            .map(|entry| json!({ "po_doc_entry": entry, "po_doc_num": format!("PO{entry}") }))
            .collect();
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/grn/batches/{batch_id}/purchase-orders"),
                Some(json!({ "purchase_orders": pos })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), 200, "linking POs failed");

        let overview = self.overview(token, batch_id).await;
        doc_entries
            .iter()
            .map(|entry| {
                overview["data"]["po_links"]
                    .as_array()
                    .expect("po_links")
                    .iter()
                    .find(|l| l["link"]["po_doc_entry"].as_i64() == Some(i64::from(*entry)))
                    .and_then(|l| l["link"]["id"].as_i64())
                    .expect("link id")
            })
            .collect()
    }

    /// Selects one standard line of `quantity` on a link and returns its id
    pub async fn select_line(
        &self,
        token: &str,
        batch_id: i64,
        link_id: i64,
        item_code: &str,
        quantity: &str,
        inventory_type: InventoryType,
    ) -> i64 {
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/grn/batches/{batch_id}/lines"),
                Some(json!({
                    "lines": [{
                        "po_link_id": link_id,
                        "po_line_num": 0,
                        "item_code": item_code,
                        "ordered_quantity": quantity,
                        "open_quantity": quantity,
                        "warehouse_code": "WH-MAIN",
                        "inventory_type": inventory_type,
                    }]
                })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), 200, "line selection failed");

        let overview = self.overview(token, batch_id).await;
        overview["data"]["po_links"]
            .as_array()
            .expect("po_links")
            .iter()
            .filter(|l| l["link"]["id"].as_i64() == Some(link_id))
            .flat_map(|l| l["lines"].as_array().cloned().unwrap_or_default())
            .find(|l| l["line"]["item_code"] == item_code)
            .and_then(|l| l["line"]["id"].as_i64())
            .expect("line id")
    }

    pub async fn overview(&self, token: &str, batch_id: i64) -> Value {
        let response = self
            .request(
                Method::GET,
                &format!("/api/v1/grn/batches/{batch_id}"),
                None,
                Some(token),
            )
            .await;
        assert_eq!(response.status(), 200, "overview failed");
        response_json(response).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response was not JSON")
}
