//! Service Layer client against a mocked SAP server.

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use multi_grn_api::{
    circuit_breaker::{CircuitBreaker, CircuitState},
    config::SapConfig,
    sap::{GoodsReceiptDocument, GoodsReceiptLine, SapError, SapGateway, ServiceLayerClient},
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> SapConfig {
    SapConfig {
        server_url: server.uri(),
        username: "manager".into(),
        password: "secret".into(),
        company_db: "SBODEMO".into(),
        ..Default::default()
    }
}

fn client(server: &MockServer, breaker: CircuitBreaker) -> ServiceLayerClient {
    ServiceLayerClient::new(config(server), breaker).expect("client")
}

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(2, Duration::from_secs(60), 1)
}

async fn mount_login(server: &MockServer, session: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/b1s/v1/Login"))
        .and(body_partial_json(json!({ "CompanyDB": "SBODEMO", "UserName": "manager" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "SessionId": session })))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

fn receipt() -> GoodsReceiptDocument {
    let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    GoodsReceiptDocument {
        card_code: "V-ACME".into(),
        doc_date: today,
        doc_due_date: today,
        comments: "Auto-created from batch 1".into(),
        num_at_card: "BATCH-1-PO-4501".into(),
        branch_id: 5,
        document_lines: vec![GoodsReceiptLine {
            base_type: Some(22),
            base_entry: Some(101),
            base_line: Some(0),
            item_code: "A-100".into(),
            quantity: 10.0,
            warehouse_code: "WH-MAIN".into(),
            bin_allocations: None,
            batch_numbers: None,
            serial_numbers: None,
        }],
    }
}

#[tokio::test]
async fn posts_receipt_with_the_session_cookie() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/PurchaseDeliveryNotes"))
        .and(header("cookie", "B1SESSION=abc"))
        .and(body_partial_json(json!({
            "CardCode": "V-ACME",
            "BPL_IDAssignedToInvoice": 5,
            "DocDate": "2024-03-05",
            "DocumentLines": [{ "BaseType": 22, "BaseEntry": 101, "ItemCode": "A-100" }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "DocEntry": 812, "DocNum": 7001 })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server, breaker())
        .post_goods_receipt(&receipt())
        .await
        .expect("receipt created");
    assert_eq!(created.doc_entry, 812);
    assert_eq!(created.doc_num, "7001");
}

#[tokio::test]
async fn expired_session_triggers_one_relogin() {
    let server = MockServer::start().await;
    mount_login(&server, "stale", 1).await;
    mount_login(&server, "fresh", 1).await;

    Mock::given(method("POST"))
        .and(path("/b1s/v1/PurchaseDeliveryNotes"))
        .and(header("cookie", "B1SESSION=stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/PurchaseDeliveryNotes"))
        .and(header("cookie", "B1SESSION=fresh"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "DocEntry": 9, "DocNum": "70" })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server, breaker())
        .post_goods_receipt(&receipt())
        .await
        .expect("posted after re-login");
    assert_eq!(created.doc_num, "70");
}

#[tokio::test]
async fn rejected_receipt_carries_sap_message() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/PurchaseDeliveryNotes"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": -5002, "message": { "value": "Quantity exceeds open quantity" } }
        })))
        .mount(&server)
        .await;

    let err = client(&server, breaker())
        .post_goods_receipt(&receipt())
        .await
        .unwrap_err();
    assert_matches!(err, SapError::Http { status: 400, ref body } if body.contains("exceeds open quantity"));
}

#[tokio::test]
async fn login_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/Login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid credentials"))
        .mount(&server)
        .await;

    let err = client(&server, breaker()).document_series().await.unwrap_err();
    assert_matches!(err, SapError::LoginFailed(msg) if msg.contains("Invalid credentials"));
}

#[tokio::test]
async fn item_flags_come_from_the_validation_query() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/SQLQueries('ItemCode_Batch_Serial_Val')/List"))
        .and(body_partial_json(json!({ "ParamList": "itemCode='B-200'" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "ItemCode": "B-200", "BatchNum": "Y", "SerialNum": "N", "NonBatch_NonSerialMethod": "A" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/SQLQueries('ItemCode_Batch_Serial_Val')/List"))
        .and(body_partial_json(json!({ "ParamList": "itemCode='NOPE'" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let sap = client(&server, breaker());
    let item = sap.validate_item("B-200").await.expect("known item");
    assert!(item.batch_managed);
    assert!(!item.serial_managed);

    let err = sap.validate_item("NOPE").await.unwrap_err();
    assert_matches!(err, SapError::ItemNotFound(code) if code == "NOPE");
}

#[tokio::test]
async fn open_orders_accept_quoted_column_aliases() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/SQLQueries('Get_Multi_Open_PO_DocNum')/List"))
        .and(body_partial_json(json!({ "ParamList": "SeriesID='101'&cardCode='V-O''NEIL'" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "'DocEntry'": "101", "'PO_Document_Number'": 4501, "'Vendor Code'": "V-O'NEIL", "'Posting Date'": "20240115" },
                { "'DocEntry'": 102, "'PO_Document_Number'": "4502" }
            ]
        })))
        .mount(&server)
        .await;

    let orders = client(&server, breaker())
        .open_purchase_orders("101", "V-O'NEIL")
        .await
        .expect("open orders");
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].doc_entry, 101);
    assert_eq!(orders[0].doc_num, "4501");
    assert_eq!(orders[0].parsed_doc_date(), NaiveDate::from_ymd_opt(2024, 1, 15));
    assert_eq!(orders[1].card_code, None);
}

#[tokio::test]
async fn series_vendors_are_listed_once() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("GET"))
        .and(path("/b1s/v1/PurchaseOrders"))
        .and(query_param("$filter", "Series eq 101 and DocumentStatus eq 'bost_Open'"))
        .and(query_param("$select", "CardCode,CardName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "CardCode": "V-ACME", "CardName": "Acme Supplies" },
                { "CardCode": "V-ACME", "CardName": "Acme Supplies" },
                { "CardCode": "V-BLUE", "CardName": "Blue Plastics" }
            ]
        })))
        .mount(&server)
        .await;

    let vendors = client(&server, breaker())
        .card_codes_by_series(101)
        .await
        .expect("vendors");
    let codes: Vec<_> = vendors.iter().map(|v| v.card_code.as_str()).collect();
    assert_eq!(codes, ["V-ACME", "V-BLUE"]);
}

#[tokio::test]
async fn server_errors_open_the_circuit() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("POST"))
        .and(path("/b1s/v1/SQLQueries('Get_PO_Series')/List"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let breaker = breaker();
    let sap = client(&server, breaker.clone());
    for _ in 0..2 {
        let err = sap.document_series().await.unwrap_err();
        assert_matches!(err, SapError::Http { status: 503, .. });
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // Rejected locally, the server sees no third call
    let err = sap.document_series().await.unwrap_err();
    assert_matches!(err, SapError::CircuitOpen);
}
