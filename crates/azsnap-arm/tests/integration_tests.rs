use azsnap_arm::{
    AccessToken, ArmError, ClientOptions, DeviceCodeCredential, DeviceCodeCredentialOptions,
    DeviceCodeInfo, Snapshot, SnapshotPager, SnapshotsApi, SnapshotsClient, TokenCredential,
    ARM_SCOPE,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SNAPSHOT_PATH: &str =
    "^/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/snapshots/snap";

struct StaticToken;

#[async_trait]
impl TokenCredential for StaticToken {
    async fn get_token(&self, _scopes: &[&str]) -> azsnap_arm::Result<AccessToken> {
        Ok(AccessToken {
            token: "arm-token".into(),
            expires_on: Utc::now() + ChronoDuration::hours(1),
        })
    }
}

fn client_for(server: &Server) -> SnapshotsClient {
    SnapshotsClient::new(
        "sub-1",
        Arc::new(StaticToken),
        ClientOptions {
            endpoint: server.url(),
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        },
    )
    .unwrap()
}

fn api_version() -> Matcher {
    Matcher::UrlEncoded("api-version".into(), "2023-04-02".into())
}

mod device_code {
    use super::*;

    fn credential_for(server: &Server, prompts: Arc<Mutex<Vec<String>>>) -> DeviceCodeCredential {
        DeviceCodeCredential::new(
            DeviceCodeCredentialOptions::new("tenant-1", "client-1")
                .with_authority_host(server.url())
                .with_user_prompt(Arc::new(move |info: &DeviceCodeInfo| {
                    prompts.lock().unwrap().push(info.message.clone());
                })),
        )
        .unwrap()
    }

    async fn mock_device_code(server: &mut Server) -> mockito::Mock {
        server
            .mock("POST", "/tenant-1/oauth2/v2.0/devicecode")
            .match_body(Matcher::UrlEncoded("client_id".into(), "client-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "device_code": "dev-code",
                    "user_code": "ABCD1234",
                    "verification_uri": "https://microsoft.com/devicelogin",
                    "expires_in": 900,
                    "interval": 0,
                    "message": "To sign in, use a web browser to open the page https://microsoft.com/devicelogin and enter the code ABCD1234 to authenticate."
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    #[tokio::test]
    async fn login_completes_and_caches_token() {
        let mut server = Server::new_async().await;
        let device = mock_device_code(&mut server).await;
        let token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("device_code".into(), "dev-code".into()),
                Matcher::UrlEncoded(
                    "grant_type".into(),
                    "urn:ietf:params:oauth:grant-type:device_code".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "token_type": "Bearer",
                    "access_token": "arm-access",
                    "refresh_token": "arm-refresh",
                    "expires_in": 3600
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let prompts = Arc::new(Mutex::new(Vec::new()));
        let credential = credential_for(&server, prompts.clone());

        let access = credential.authenticate().await.unwrap();
        assert_eq!(access.token, "arm-access");

        // Served from cache, no second token request.
        let cached = credential.get_token(&[ARM_SCOPE]).await.unwrap();
        assert_eq!(cached.token, "arm-access");

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("enter the code ABCD1234 to authenticate."));

        device.assert_async().await;
        token.assert_async().await;
    }

    #[tokio::test]
    async fn declined_login_surfaces_provider_error() {
        let mut server = Server::new_async().await;
        let _device = mock_device_code(&mut server).await;
        let _token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": "authorization_declined",
                    "error_description": "AADSTS70000: The user declined."
                })
                .to_string(),
            )
            .create_async()
            .await;

        let credential = credential_for(&server, Arc::new(Mutex::new(Vec::new())));
        let err = credential.authenticate().await.unwrap_err();

        match err {
            ArmError::Auth { code, description } => {
                assert_eq!(code, "authorization_declined");
                assert!(description.contains("declined"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            credential.get_token(&[ARM_SCOPE]).await,
            Err(ArmError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn device_code_request_failure_is_reported() {
        let mut server = Server::new_async().await;
        let _device = server
            .mock("POST", "/tenant-1/oauth2/v2.0/devicecode")
            .with_status(400)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let credential = credential_for(&server, Arc::new(Mutex::new(Vec::new())));
        let err = credential.authenticate().await.unwrap_err();
        assert!(matches!(err, ArmError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn stale_token_is_refreshed() {
        let mut server = Server::new_async().await;
        let _device = mock_device_code(&mut server).await;
        let login = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::UrlEncoded("device_code".into(), "dev-code".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "access_token": "short-lived",
                    "refresh_token": "refresh-1",
                    "expires_in": 60
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "access_token": "renewed",
                    "refresh_token": "refresh-2",
                    "expires_in": 3600
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let credential = credential_for(&server, Arc::new(Mutex::new(Vec::new())));
        let first = credential.authenticate().await.unwrap();
        assert_eq!(first.token, "short-lived");

        // Inside the expiry margin, so the refresh token is redeemed.
        let renewed = credential.get_token(&[ARM_SCOPE]).await.unwrap();
        assert_eq!(renewed.token, "renewed");

        // The renewed token is cached.
        let cached = credential.get_token(&[ARM_SCOPE]).await.unwrap();
        assert_eq!(cached.token, "renewed");

        login.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_refresh_is_an_auth_error() {
        let mut server = Server::new_async().await;
        let _device = mock_device_code(&mut server).await;
        let _login = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::UrlEncoded("device_code".into(), "dev-code".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "access_token": "short-lived", "refresh_token": "refresh-1", "expires_in": 60 })
                    .to_string(),
            )
            .create_async()
            .await;
        let _refresh = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "error": "invalid_grant", "error_description": "AADSTS70008: expired" })
                    .to_string(),
            )
            .create_async()
            .await;

        let credential = credential_for(&server, Arc::new(Mutex::new(Vec::new())));
        credential.authenticate().await.unwrap();

        match credential.get_token(&[ARM_SCOPE]).await.unwrap_err() {
            ArmError::Auth { code, .. } => assert_eq!(code, "invalid_grant"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_down_lengthens_the_poll_interval() {
        let mut server = Server::new_async().await;
        let _device = mock_device_code(&mut server).await;
        let slow_down = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(json!({ "error": "slow_down" }).to_string())
            .expect(1)
            .create_async()
            .await;
        let granted = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "access_token": "arm-access", "expires_in": 3600 }).to_string())
            .expect(1)
            .create_async()
            .await;

        let credential = credential_for(&server, Arc::new(Mutex::new(Vec::new())));
        let started = Instant::now();
        let access = credential.authenticate().await.unwrap();

        assert_eq!(access.token, "arm-access");
        // Device interval is 0, so the only wait is the 5 second slow_down increment.
        assert!(started.elapsed() >= Duration::from_secs(5));
        slow_down.assert_async().await;
        granted.assert_async().await;
    }
}

mod snapshots {
    use super::*;

    #[tokio::test]
    async fn create_waits_for_async_operation_success() {
        let mut server = Server::new_async().await;
        let status_url = format!("{}/operations/op-1", server.url());

        let put = server
            .mock("PUT", Matcher::Regex(SNAPSHOT_PATH.into()))
            .match_query(api_version())
            .match_header("authorization", "Bearer arm-token")
            .match_body(Matcher::PartialJson(json!({
                "location": "westeurope",
                "properties": { "creationData": { "createOption": "Copy", "sourceUri": "/disks/os" } }
            })))
            .with_status(201)
            .with_header("azure-asyncoperation", &status_url)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"snap","properties":{"provisioningState":"Creating"}}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", Matcher::Regex("^/operations/op-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"Succeeded"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client
            .begin_create_or_update("rg", "snap", Snapshot::copy_of("/disks/os", "westeurope"))
            .await
            .unwrap();
        operation.poll_until_done().await.unwrap();

        put.assert_async().await;
        status.assert_async().await;
    }

    #[tokio::test]
    async fn failed_async_operation_is_an_error() {
        let mut server = Server::new_async().await;
        let status_url = format!("{}/operations/op-2", server.url());

        let _put = server
            .mock("PUT", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(201)
            .with_header("azure-asyncoperation", &status_url)
            .create_async()
            .await;
        let _status = server
            .mock("GET", Matcher::Regex("^/operations/op-2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "Failed",
                    "error": { "code": "InvalidParameter", "message": "sourceUri is invalid" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client
            .begin_create_or_update("rg", "snap", Snapshot::copy_of("bogus", "westeurope"))
            .await
            .unwrap();
        let err = operation.poll_until_done().await.unwrap_err();

        match err {
            ArmError::OperationFailed { status, message } => {
                assert_eq!(status, "Failed");
                assert!(message.contains("sourceUri is invalid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn rejected_submission_is_an_error() {
        let mut server = Server::new_async().await;
        let _put = server
            .mock("PUT", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"AuthorizationFailed","message":"no access"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .begin_create_or_update("rg", "snap", Snapshot::copy_of("/disks/os", "westeurope"))
            .await
            .err()
            .unwrap();

        match err {
            ArmError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AuthorizationFailed");
                assert_eq!(message, "no access");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn delete_follows_location_header() {
        let mut server = Server::new_async().await;
        let location = format!("{}/locations/op-3", server.url());

        let delete = server
            .mock("DELETE", Matcher::Regex(SNAPSHOT_PATH.into()))
            .match_query(api_version())
            .with_status(202)
            .with_header("location", &location)
            .create_async()
            .await;
        let poll = server
            .mock("GET", Matcher::Regex("^/locations/op-3".into()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client.begin_delete("rg", "snap").await.unwrap();
        operation.poll_until_done().await.unwrap();

        delete.assert_async().await;
        poll.assert_async().await;
    }

    #[tokio::test]
    async fn delete_of_absent_snapshot_completes_immediately() {
        let mut server = Server::new_async().await;
        let _delete = server
            .mock("DELETE", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client.begin_delete("rg", "snap").await.unwrap();
        operation.poll_until_done().await.unwrap();
    }

    #[tokio::test]
    async fn create_polls_resource_until_provisioned() {
        let mut server = Server::new_async().await;
        let _put = server
            .mock("PUT", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"snap","properties":{"provisioningState":"Creating"}}"#)
            .create_async()
            .await;
        let creating = server
            .mock("GET", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"snap","properties":{"provisioningState":"Creating"}}"#)
            .expect(1)
            .create_async()
            .await;
        let succeeded = server
            .mock("GET", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"snap","properties":{"provisioningState":"Succeeded"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client
            .begin_create_or_update("rg", "snap", Snapshot::copy_of("/disks/os", "westeurope"))
            .await
            .unwrap();
        operation.poll_until_done().await.unwrap();

        creating.assert_async().await;
        succeeded.assert_async().await;
    }

    #[tokio::test]
    async fn create_whose_resource_vanishes_is_an_error() {
        let mut server = Server::new_async().await;
        let _put = server
            .mock("PUT", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"properties":{"provisioningState":"Creating"}}"#)
            .create_async()
            .await;
        let _get = server
            .mock("GET", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"ResourceNotFound","message":"snapshot 'snap' not found"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client
            .begin_create_or_update("rg", "snap", Snapshot::copy_of("/disks/os", "westeurope"))
            .await
            .unwrap();
        let err = operation.poll_until_done().await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn create_already_failed_is_reported_while_polling() {
        let mut server = Server::new_async().await;
        let _put = server
            .mock("PUT", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"snap","properties":{"provisioningState":"Failed"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        // Submission itself is accepted.
        let mut operation = client
            .begin_create_or_update("rg", "snap", Snapshot::copy_of("/disks/os", "westeurope"))
            .await
            .unwrap();
        let err = operation.poll_until_done().await.unwrap_err();
        assert!(matches!(err, ArmError::OperationFailed { ref status, .. } if status == "Failed"));
    }

    #[tokio::test]
    async fn delete_without_tracking_headers_ends_on_not_found() {
        let mut server = Server::new_async().await;
        let _delete = server
            .mock("DELETE", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(202)
            .create_async()
            .await;
        let gone = server
            .mock("GET", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(404)
            .with_body(r#"{"error":{"code":"ResourceNotFound","message":"gone"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client.begin_delete("rg", "snap").await.unwrap();
        operation.poll_until_done().await.unwrap();
        gone.assert_async().await;
    }

    #[tokio::test]
    async fn location_poll_waits_through_accepted() {
        let mut server = Server::new_async().await;
        let location = format!("{}/locations/op-4", server.url());

        let _delete = server
            .mock("DELETE", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(202)
            .with_header("location", &location)
            .create_async()
            .await;
        let pending = server
            .mock("GET", Matcher::Regex("^/locations/op-4".into()))
            .with_status(202)
            .with_header("location", &location)
            .with_header("retry-after", "0")
            .expect(1)
            .create_async()
            .await;
        let finished = server
            .mock("GET", Matcher::Regex("^/locations/op-4".into()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut operation = client.begin_delete("rg", "snap").await.unwrap();
        operation.poll_until_done().await.unwrap();

        pending.assert_async().await;
        finished.assert_async().await;
    }

    #[tokio::test]
    async fn get_missing_snapshot_is_not_found() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", Matcher::Regex(SNAPSHOT_PATH.into()))
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"ResourceNotFound","message":"snapshot 'snap' not found"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get("rg", "snap").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("ResourceNotFound"));
    }

    #[tokio::test]
    async fn pager_walks_every_page() {
        let mut server = Server::new_async().await;
        let next = format!("{}/next-page?token=abc", server.url());

        let first = server
            .mock(
                "GET",
                Matcher::Regex("^/subscriptions/sub-1/providers/Microsoft.Compute/snapshots".into()),
            )
            .match_query(api_version())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "value": [
                        { "name": "a", "id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/snapshots/a",
                          "properties": { "timeCreated": "2024-01-01T00:00:00+00:00" } }
                    ],
                    "nextLink": next
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", Matcher::Regex("^/next-page".into()))
            .match_query(Matcher::UrlEncoded("token".into(), "abc".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "value": [ { "name": "b" } ] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut pager = SnapshotPager::new(&client);
        let mut names = Vec::new();
        while pager.more() {
            for snapshot in pager.next_page().await.unwrap().value {
                names.extend(snapshot.name);
            }
        }

        assert_eq!(names, vec!["a", "b"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn page_failure_is_an_error() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock(
                "GET",
                Matcher::Regex("^/subscriptions/sub-1/providers/Microsoft.Compute/snapshots".into()),
            )
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let client = client_for(&server);
        let mut pager = SnapshotPager::new(&client);
        let err = pager.next_page().await.unwrap_err();
        match err {
            ArmError::Api { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
