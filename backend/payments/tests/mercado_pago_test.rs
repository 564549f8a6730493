use httpmock::prelude::*;
use payments::{
    BackUrls, Error, Gateway, MercadoPago, PreferenceItem, PreferenceRequest,
    models::{AUTO_RETURN, CURRENCY},
};
use rust_decimal_macros::dec;
use serde_json::json;

fn preference() -> PreferenceRequest {
    PreferenceRequest {
        items: vec![PreferenceItem {
            id: "bike-1".to_string(),
            title: "Bicicleta elétrica aro 26".to_string(),
            description: None,
            picture_url: None,
            category_id: None,
            quantity: 2,
            currency_id: CURRENCY.to_string(),
            unit_price: dec!(4599.90),
        }],
        payer: None,
        back_urls: BackUrls {
            success: "http://shop/sucesso".to_string(),
            failure: "http://shop/falha".to_string(),
            pending: "http://shop/pendente".to_string(),
        },
        auto_return: AUTO_RETURN.to_string(),
        notification_url: "http://api/api/pagamento/webhook".to_string(),
        external_reference: "order-1".to_string(),
        shipments: None,
        metadata: None,
    }
}

#[tokio::test]
async fn test_create_preference_sends_token_and_idempotency_key() {
    let server = MockServer::start_async().await;

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/checkout/preferences")
                .header("authorization", "Bearer TEST-TOKEN")
                .header("x-idempotency-key", "key-1")
                .json_body_partial(
                    r#"{
                        "external_reference": "order-1",
                        "auto_return": "approved",
                        "items": [{ "id": "bike-1", "quantity": 2, "currency_id": "BRL", "unit_price": 4599.9 }]
                    }"#,
                );
            then.status(201).json_body(json!({
                "id": "pref-123",
                "init_point": "https://mp/checkout?pref_id=pref-123",
                "sandbox_init_point": "https://sandbox.mp/checkout?pref_id=pref-123",
                "collector_id": 1
            }));
        })
        .await;

    let client = MercadoPago::with_base_url(server.base_url(), "TEST-TOKEN").unwrap();
    let created = client.create_preference(&preference(), "key-1").await.unwrap();

    mock.assert_async().await;
    assert_eq!(created.id, "pref-123");
    assert_eq!(created.init_point, "https://mp/checkout?pref_id=pref-123");
    assert!(created.sandbox_init_point.is_some());
}

#[tokio::test]
async fn test_rejected_preference_keeps_status_and_body() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/checkout/preferences");
            then.status(400)
                .json_body(json!({ "message": "invalid unit_price", "status": 400 }));
        })
        .await;

    let client = MercadoPago::with_base_url(server.base_url(), "TEST-TOKEN").unwrap();
    let error = client
        .create_preference(&preference(), "key-1")
        .await
        .unwrap_err();

    match error {
        Error::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid unit_price"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_get_payment() {
    let server = MockServer::start_async().await;

    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/payments/987654")
                .header("authorization", "Bearer TEST-TOKEN");
            then.status(200).json_body(json!({
                "id": 987654,
                "status": "approved",
                "status_detail": "accredited",
                "external_reference": "order-1",
                "transaction_amount": 9199.8
            }));
        })
        .await;

    let client = MercadoPago::with_base_url(format!("{}/", server.base_url()), "TEST-TOKEN").unwrap();
    let payment = client.get_payment("987654").await.unwrap();

    mock.assert_async().await;
    assert_eq!(payment.id, 987654);
    assert_eq!(payment.status, "approved");
    assert_eq!(payment.external_reference.as_deref(), Some("order-1"));
    assert_eq!(payment.transaction_amount, Some(dec!(9199.8)));
}

#[tokio::test]
async fn test_missing_payment_is_rejected() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payments/1");
            then.status(404).body("not found");
        })
        .await;

    let client = MercadoPago::with_base_url(server.base_url(), "TEST-TOKEN").unwrap();

    assert!(matches!(
        client.get_payment("1").await,
        Err(Error::Rejected { status: 404, .. })
    ));
}
