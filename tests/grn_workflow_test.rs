mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use multi_grn_api::entities::grn::InventoryType;
use serde_json::json;

#[tokio::test]
async fn batch_travels_from_draft_to_posted() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();
    let reviewer = app.reviewer_token();

    let batch_id = app.create_batch(&clerk).await;
    let overview = app.overview(&clerk, batch_id).await;
    assert_eq!(overview["data"]["batch"]["status"], "draft");
    assert!(overview["data"]["batch"]["batch_number"]
        .as_str()
        .unwrap()
        .starts_with("MGRN-"));

    let links = app.link_pos(&clerk, batch_id, &[101, 102]).await;
    let overview = app.overview(&clerk, batch_id).await;
    assert_eq!(overview["data"]["batch"]["status"], "collecting");
    assert_eq!(overview["data"]["batch"]["total_pos"], 2);

    // Submitting with nothing selected is refused
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/submit-qc"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.select_line(&clerk, batch_id, links[0], "A-100", "10", InventoryType::Standard)
        .await;
    let batch_line = app
        .select_line(&clerk, batch_id, links[1], "B-200", "5", InventoryType::Batch)
        .await;

    // The batch-managed line has no batch rows yet
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/submit-qc"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["details"], json!(["PO PO102 - B-200"]));

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/lines/{batch_line}/batch-details"),
            Some(json!({ "batch_number": "LOT-1", "quantity": "5", "expiry_date": "2026-01-31" })),
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/submit-qc"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "pending_qc");

    // Clerks cannot review, and the batch is frozen while pending
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/qc/approve"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/grn/batches/{batch_id}/lines/{batch_line}"),
            Some(json!({ "warehouse_code": "WH-2" })),
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Rejection needs notes
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/qc/reject"),
            Some(json!({})),
            Some(&reviewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/qc/reject"),
            Some(json!({ "notes": "Expiry label unreadable" })),
            Some(&reviewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "qc_rejected");
    assert_eq!(body["data"]["qc_approver_id"], common::REVIEWER);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/reset"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "collecting");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/submit-qc"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/grn/qc/dashboard", None, Some(&reviewer))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let dashboard = response_json(response).await;
    assert_eq!(dashboard["data"]["pending"][0]["id"].as_i64(), Some(batch_id));

    // Approval works without a body
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/qc/approve"),
            None,
            Some(&reviewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "qc_approved");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/post"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = response_json(response).await;
    assert_eq!(outcome["data"]["total_success"], 2);
    assert_eq!(outcome["data"]["batch_completed"], true);

    let posted = app.sap.posted_documents();
    assert_eq!(posted.len(), 2);
    assert!(posted.iter().all(|doc| doc.branch_id == 3));
    let batch_doc = posted
        .iter()
        .find(|doc| doc.document_lines[0].item_code == "B-200")
        .expect("receipt for the batch-managed PO");
    assert_eq!(batch_doc.document_lines[0].base_entry, Some(102));
    let lots = batch_doc.document_lines[0].batch_numbers.as_ref().unwrap();
    assert_eq!(lots[0].batch_number, "LOT-1");

    let overview = app.overview(&clerk, batch_id).await;
    assert_eq!(overview["data"]["batch"]["status"], "posted");
    assert_eq!(overview["data"]["batch"]["total_grns_created"], 2);
    assert!(overview["data"]["po_links"]
        .as_array()
        .unwrap()
        .iter()
        .all(|l| l["link"]["status"] == "posted"));

    // Posting twice is refused
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/post"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requests_without_module_access_are_refused() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/grn/batches", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let outsider = app.token("outsider", &[], &[]);
    let response = app
        .request(
            Method::POST,
            "/api/v1/grn/batches",
            Some(json!({ "customer_code": "V-ACME", "customer_name": "Acme" })),
            Some(&outsider),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::GET, "/api/v1/grn/qc/dashboard", None, Some(&outsider))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn batches_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();
    let other = app.other_clerk_token();
    let batch_id = app.create_batch(&clerk).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/grn/batches/{batch_id}"),
            None,
            Some(&other),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::GET, "/api/v1/grn/batches", None, Some(&other))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["total"], 0);

    // Reviewers may look but not touch
    let reviewer = app.reviewer_token();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/grn/batches/{batch_id}"),
            None,
            Some(&reviewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/purchase-orders"),
            Some(json!({ "purchase_orders": [{ "po_doc_entry": 101, "po_doc_num": "4501" }] })),
            Some(&reviewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::GET, "/api/v1/grn/batches", None, Some(&clerk))
        .await;
    assert_eq!(response_json(response).await["data"]["total"], 1);
}

#[tokio::test]
async fn only_draft_batches_can_be_deleted() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();

    let draft = app.create_batch(&clerk).await;
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/grn/batches/{draft}"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let collecting = app.create_batch(&clerk).await;
    app.link_pos(&clerk, collecting, &[101]).await;
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/grn/batches/{collecting}"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_docs_are_served() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["details"]["database"]["status"], "up");

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn purchase_orders_without_lines_block_submission() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();
    let reviewer = app.reviewer_token();
    let batch_id = app.create_batch(&clerk).await;
    let links = app.link_pos(&clerk, batch_id, &[101, 102]).await;
    app.select_line(&clerk, batch_id, links[0], "A-1", "3", InventoryType::Standard)
        .await;

    let submit_uri = format!("/api/v1/grn/batches/{batch_id}/submit-qc");
    let response = app.request(Method::POST, &submit_uri, None, Some(&clerk)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["details"], json!(["PO PO102 - no line items selected"]));

    // Dropping the empty PO lets the rest go through to SAP
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/grn/batches/{batch_id}/purchase-orders/{}", links[1]),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.request(Method::POST, &submit_uri, None, Some(&clerk)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/qc/approve"),
            None,
            Some(&reviewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/grn/batches/{batch_id}/post"),
            None,
            Some(&clerk),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = response_json(response).await;
    assert_eq!(outcome["data"]["status"], "posted");
    assert_eq!(outcome["data"]["total_links"], 1);
    assert_eq!(app.sap.posted_documents().len(), 1);
}
