//! Tests for DriveClient with mocked HTTP responses.

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use serde_json::json;
use drive_uploader::models::{
    Credentials, FileListResponse, FileMetadata, DEFAULT_AUTH_URI, FOLDER_MIME_TYPE,
};
use drive_uploader::{Authenticator, DriveClient, DriveError, OAuthClient, Token};
use std::io::Write;
use tempfile::NamedTempFile;

fn credentials(server_url: &str) -> Credentials {
    Credentials {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_uris: vec!["http://localhost".to_string()],
        auth_uri: DEFAULT_AUTH_URI.to_string(),
        token_uri: format!("{}/token", server_url),
    }
}

fn valid_token() -> Token {
    Token {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        token_type: "Bearer".to_string(),
        expiry: Some(Utc::now() + Duration::hours(1)),
    }
}

fn client_with_token(server: &Server, token: Token) -> DriveClient {
    let auth = Authenticator::new(OAuthClient::new(credentials(&server.url())), token);
    DriveClient::new(auth).with_base_urls(server.url(), format!("{}/upload", server.url()))
}

fn folder_json(id: &str, name: &str) -> serde_json::Value {
    json!({"id": id, "name": name, "mimeType": FOLDER_MIME_TYPE})
}

mod models {
    use super::*;

    #[test]
    fn test_file_metadata_deserialization() {
        let json = json!({
            "id": "file123",
            "name": "document.pdf",
            "mimeType": "application/pdf",
            "webViewLink": "https://drive.google.com/file/d/file123/view",
            "size": "2048"
        });

        let metadata: FileMetadata = serde_json::from_value(json).unwrap();

        assert_eq!(metadata.id, "file123");
        assert_eq!(metadata.name, "document.pdf");
        assert_eq!(metadata.mime_type, Some("application/pdf".to_string()));
        assert_eq!(metadata.size, Some(2048));
    }

    #[test]
    fn test_file_list_response_deserialization() {
        let json = json!({
            "files": [
                {"id": "f1", "name": "file1.txt"},
                {"id": "f2", "name": "file2.txt"}
            ],
            "nextPageToken": "token123"
        });

        let response: FileListResponse = serde_json::from_value(json).unwrap();

        assert_eq!(response.files.len(), 2);
        assert_eq!(response.next_page_token, Some("token123".to_string()));
    }

    #[test]
    fn test_display() {
        let metadata = FileMetadata {
            id: "abc123".to_string(),
            name: "document.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            web_view_link: None,
            size: Some(1048576),
        };

        let display = format!("{}", metadata);
        assert!(display.contains("abc123"));
        assert!(display.contains("document.pdf"));
        assert!(display.contains("1.00 MB"));
    }
}

mod credentials_file {
    use super::*;

    #[test]
    fn test_oauth_client_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "secret",
                "redirect_uris": ["http://localhost"]
            }
        });
        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        let client = OAuthClient::from_file(temp_file.path()).unwrap();
        assert_eq!(client.credentials().client_id, "id.apps.googleusercontent.com");
    }

    #[test]
    fn test_missing_credentials_file() {
        let err = OAuthClient::from_file("/nonexistent/path/credentials.json").unwrap_err();
        assert!(matches!(err, DriveError::CredentialsNotFound(_)));
    }

    #[test]
    fn test_malformed_credentials_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();

        let err = OAuthClient::from_file(temp_file.path()).unwrap_err();
        assert!(matches!(err, DriveError::CredentialsMalformed { .. }));
    }
}

mod folders {
    use super::*;

    #[tokio::test]
    async fn test_creates_missing_folder() {
        let mut server = Server::new_async().await;
        let query = server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                format!(
                    "name = 'sub' and mimeType = '{}' and 'root-id' in parents and trashed = false",
                    FOLDER_MIME_TYPE
                ),
            ))
            .match_header("authorization", "Bearer access")
            .with_header("content-type", "application/json")
            .with_body(json!({"files": []}).to_string())
            .expect(1)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "name": "sub",
                "mimeType": FOLDER_MIME_TYPE,
                "parents": ["root-id"]
            })))
            .with_header("content-type", "application/json")
            .with_body(folder_json("sub-id", "sub").to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client_with_token(&server, valid_token());
        let resolution = client
            .find_or_create_folder("sub", Some("root-id"))
            .await
            .unwrap();

        assert!(resolution.created);
        assert_eq!(resolution.folder.id, "sub-id");
        query.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_existing_folder_first_match_wins() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                format!(
                    "name = 'project' and mimeType = '{}' and 'root' in parents and trashed = false",
                    FOLDER_MIME_TYPE
                ),
            ))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"files": [folder_json("first", "project"), folder_json("second", "project")]})
                    .to_string(),
            )
            .create_async()
            .await;
        let create = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_with_token(&server, valid_token());
        let resolution = client.find_or_create_folder("project", None).await.unwrap();

        assert!(!resolution.created);
        assert_eq!(resolution.folder.id, "first");
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_call_returns_created_folder() {
        let mut server = Server::new_async().await;
        // Before creation the query finds nothing, afterwards it finds the folder.
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": []}).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [folder_json("new-id", "photos")]}).to_string())
            .expect(1)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(folder_json("new-id", "photos").to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client_with_token(&server, valid_token());
        let first = client.find_or_create_folder("photos", None).await.unwrap();
        let second = client.find_or_create_folder("photos", None).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.folder.id, second.folder.id);
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_follows_pages() {
        let mut server = Server::new_async().await;
        // The first request ends with the fields parameter, no page token.
        server
            .mock("GET", "/files")
            .match_query(Matcher::Regex("fields=[^&]*$".into()))
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "a", "name": "a"}], "nextPageToken": "p2"}).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "b", "name": "b"}]}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client_with_token(&server, valid_token());
        let files = client.query_files("trashed = false").await.unwrap();

        let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error": {"code": 403, "message": "Insufficient Permission"}}).to_string(),
            )
            .create_async()
            .await;

        let client = client_with_token(&server, valid_token());
        let err = client.find_or_create_folder("x", None).await.unwrap_err();

        match err {
            DriveError::ApiError { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Insufficient Permission");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

mod uploads {
    use super::*;

    #[tokio::test]
    async fn test_upload_streams_file() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("POST", "/upload/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "multipart".into()))
            .match_header("authorization", "Bearer access")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("hello drive".into()),
                Matcher::Regex(r#""parents":\["folder-1"\]"#.into()),
                Matcher::Regex(r#""name":"notes.txt""#.into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "file-1",
                    "name": "notes.txt",
                    "mimeType": "text/plain",
                    "webViewLink": "https://drive.google.com/file/d/file-1/view",
                    "size": "11"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello drive").unwrap();

        let client = client_with_token(&server, valid_token());
        let metadata = client.upload_file(&path, Some("folder-1")).await.unwrap();

        assert_eq!(metadata.id, "file-1");
        assert_eq!(metadata.name, "notes.txt");
        assert_eq!(
            metadata.web_view_link.as_deref(),
            Some("https://drive.google.com/file/d/file-1/view")
        );
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("POST", "/upload/files")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_with_token(&server, valid_token());
        let err = client
            .upload_file("/nonexistent/report.pdf", None)
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::LocalFileNotFound(_)));
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/upload/files")
            .match_query(Matcher::Any)
            .with_status(507)
            .with_body("storage quota exceeded")
            .create_async()
            .await;

        let file = NamedTempFile::new().unwrap();
        let client = client_with_token(&server, valid_token());
        let err = client.upload_file(file.path(), None).await.unwrap_err();

        assert!(matches!(err, DriveError::ApiError { status: 507, .. }));
    }
}

mod token_refresh {
    use super::*;

    #[tokio::test]
    async fn test_expired_token_is_refreshed_transparently() {
        let mut server = Server::new_async().await;
        let refresh = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"access_token": "fresh", "token_type": "Bearer", "expires_in": 3599})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let query = server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer fresh")
            .with_header("content-type", "application/json")
            .with_body(json!({"files": []}).to_string())
            .expect(2)
            .create_async()
            .await;

        let expired = Token {
            expiry: Some(Utc::now() - Duration::minutes(5)),
            ..valid_token()
        };
        let client = client_with_token(&server, expired);

        client.query_files("trashed = false").await.unwrap();
        // The refreshed token is reused, no second refresh.
        client.query_files("trashed = false").await.unwrap();

        let token = client.authenticator().token().await;
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        refresh.assert_async().await;
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let expired = Token {
            expiry: Some(Utc::now() - Duration::minutes(5)),
            ..valid_token()
        };
        let client = client_with_token(&server, expired);
        let err = client.query_files("trashed = false").await.unwrap_err();

        assert!(matches!(err, DriveError::TokenRefreshError(_)));
    }
}
