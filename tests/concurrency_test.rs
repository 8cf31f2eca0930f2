mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use multi_grn_api::entities::grn::InventoryType;
use serde_json::json;

#[tokio::test]
async fn concurrent_links_of_the_same_po_keep_one_row() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();
    let batch_id = app.create_batch(&clerk).await;

    let uri = format!("/api/v1/grn/batches/{batch_id}/purchase-orders");
    let body = json!({ "purchase_orders": [{ "po_doc_entry": 101, "po_doc_num": "4501" }] });
    let (first, second, third) = tokio::join!(
        app.request(Method::POST, &uri, Some(body.clone()), Some(&clerk)),
        app.request(Method::POST, &uri, Some(body.clone()), Some(&clerk)),
        app.request(Method::POST, &uri, Some(body.clone()), Some(&clerk)),
    );

    let mut added = 0;
    for response in [first, second, third] {
        assert_eq!(response.status(), StatusCode::OK);
        added += response_json(response).await["data"]["added"].as_i64().unwrap();
    }
    assert_eq!(added, 1);

    let overview = app.overview(&clerk, batch_id).await;
    assert_eq!(overview["data"]["po_links"].as_array().unwrap().len(), 1);
    assert_eq!(overview["data"]["batch"]["total_pos"], 1);
}

#[tokio::test]
async fn batch_numbers_stay_unique_under_load() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();

    let (a, b, c, d) = tokio::join!(
        app.create_batch(&clerk),
        app.create_batch(&clerk),
        app.create_batch(&clerk),
        app.create_batch(&clerk),
    );

    let mut numbers = Vec::new();
    for id in [a, b, c, d] {
        let overview = app.overview(&clerk, id).await;
        numbers.push(overview["data"]["batch"]["batch_number"].as_str().unwrap().to_string());
    }
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 4);

    let response = app
        .request(Method::GET, "/api/v1/grn/batches?page=1&per_page=2", None, Some(&clerk))
        .await;
    let page = response_json(response).await;
    assert_eq!(page["data"]["total"], 4);
    assert_eq!(page["data"]["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn overlapping_post_requests_send_each_po_once() {
    let app = TestApp::new().await;
    let clerk = app.clerk_token();
    let batch_id = app.create_batch(&clerk).await;
    let links = app.link_pos(&clerk, batch_id, &[101, 102, 103]).await;
    for (link, item) in links.iter().zip(["A-1", "A-2", "A-3"]) {
        app.select_line(&clerk, batch_id, *link, item, "2", InventoryType::Standard)
            .await;
    }
    for (action, token) in [("submit-qc", clerk.clone()), ("qc/approve", app.reviewer_token())] {
        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/grn/batches/{batch_id}/{action}"),
                None,
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{action} failed");
    }

    let uri = format!("/api/v1/grn/batches/{batch_id}/post");
    let (first, second) = tokio::join!(
        app.request(Method::POST, &uri, None, Some(&clerk)),
        app.request(Method::POST, &uri, None, Some(&clerk)),
    );
    let statuses = [first.status(), second.status()];
    assert!(statuses.contains(&StatusCode::OK), "{statuses:?}");
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::OK || *s == StatusCode::CONFLICT));

    let mut receipts: Vec<_> = app
        .sap
        .posted_documents()
        .into_iter()
        .map(|doc| doc.num_at_card)
        .collect();
    receipts.sort();
    receipts.dedup();
    assert_eq!(app.sap.posted_documents().len(), 3);
    assert_eq!(receipts.len(), 3);

    let overview = app.overview(&clerk, batch_id).await;
    assert_eq!(overview["data"]["batch"]["status"], "posted");
    assert_eq!(overview["data"]["batch"]["total_grns_created"], 3);
}
