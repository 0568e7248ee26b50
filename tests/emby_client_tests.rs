use emby_ncm_bridge::api::emby::{EmbyClient, ALL_PLAYLISTS_TAG_ID, ALL_SONGS_TAG_ID};
use emby_ncm_bridge::api::emby_auth::EmbySettings;
use emby_ncm_bridge::api::CatalogSearch;
use emby_ncm_bridge::error::EmbyError;
use emby_ncm_bridge::models::{ItemSource, MusicItem, PlaylistItem};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;

fn settings(host: &str) -> EmbySettings {
    EmbySettings {
        host: host.to_string(),
        username: "alice".into(),
        password: "secret".into(),
        client_name: "Test".into(),
        device_name: "TestDevice".into(),
        device_id: "TestDevice-1".into(),
        timeout: Duration::from_secs(5),
    }
}

async fn mock_login(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", "/Users/AuthenticateByName")
        .match_body(Matcher::Json(json!({"Username": "alice", "Pw": "secret"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"AccessToken": "tok-1", "User": {"Id": "user-1"}}).to_string())
        .expect(hits)
        .create_async()
        .await
}

fn audio_items() -> serde_json::Value {
    json!({
        "Items": [
            {"Id": "a1", "Name": "Song", "Artists": ["Band"], "Album": "LP", "RunTimeTicks": 2_000_000_000i64, "ImageTags": {"Primary": "img"}},
            {"Id": "a2", "Name": "Song (Live)", "Artists": ["Band"], "Album": "Live LP"}
        ],
        "TotalRecordCount": 2
    })
}

#[tokio::test]
async fn catalog_search_logs_in_and_maps_candidates() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 1).await;
    let search = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("SearchTerm".into(), "Song Band".into()),
            Matcher::UrlEncoded("Limit".into(), "5".into()),
            Matcher::UrlEncoded("StartIndex".into(), "0".into()),
            Matcher::UrlEncoded("IncludeItemTypes".into(), "Audio".into()),
            Matcher::UrlEncoded("UserId".into(), "user-1".into()),
        ]))
        .match_header("x-emby-authorization", Matcher::Regex("Token=\"tok-1\"".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(audio_items().to_string())
        .expect(2)
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    let page = client.search_tracks("Song Band", 5).await.unwrap();
    assert!(page.is_end);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].local_id, "a1");
    assert_eq!(page.items[0].duration_secs, Some(200));
    assert_eq!(page.items[1].duration_secs, None);

    // the session is reused
    client.search_tracks("Song Band", 5).await.unwrap();
    login.assert_async().await;
    search.assert_async().await;
}

#[tokio::test]
async fn unauthorized_triggers_one_relogin() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 2).await;
    let rejected = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(audio_items().to_string())
        .expect(1)
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    let page = client.search_music("Song", 1, 10).await.unwrap();
    assert_eq!(page.items.len(), 2);
    login.assert_async().await;
    rejected.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn login_failure_surfaces_server_message() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/Users/AuthenticateByName")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error_message":"Invalid username or password"}"#)
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    match client.login().await {
        Err(EmbyError::Login { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid username or password");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn login_response_without_user_is_invalid() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/Users/AuthenticateByName")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"AccessToken":"tok"}"#)
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    assert!(matches!(client.ensure_login().await, Err(EmbyError::InvalidLoginResponse)));
}

#[tokio::test]
async fn paging_reports_more_results() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, 1).await;
    let _albums = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("IncludeItemTypes".into(), "MusicAlbum".into()),
            Matcher::UrlEncoded("StartIndex".into(), "2".into()),
            Matcher::UrlEncoded("Limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({
            "Items": [{"Id": "al1", "Name": "One", "AlbumArtists": [{"Name": "Band"}], "ProductionYear": 2001},
                      {"Id": "al2", "Name": "Two"}],
            "TotalRecordCount": 7
        }).to_string())
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 2);
    let page = client.search_albums("o", 2).await.unwrap();
    assert!(!page.is_end);
    assert_eq!(page.items[0].artist, "Band");
    assert_eq!(page.items[0].year, Some(2001));
    assert_eq!(page.items[1].artist, "unknown artist");
}

#[tokio::test]
async fn artist_search_falls_back_to_album_artists() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, 1).await;
    let primary = server
        .mock("GET", "/Artists")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    let fallback = server
        .mock("GET", "/Artists/AlbumArtists")
        .match_query(Matcher::UrlEncoded("SearchTerm".into(), "band".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"Items": [{"Id": "ar1", "Name": "Band"}], "TotalRecordCount": 1}).to_string())
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    let page = client.search_artists("band", 1).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name, "Band");
    primary.assert_async().await;
    fallback.assert_async().await;
}

#[tokio::test]
async fn virtual_all_songs_sheet_lists_library() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, 1).await;
    let all = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("IncludeItemTypes".into(), "Audio".into()),
            Matcher::UrlEncoded("StartIndex".into(), "0".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(audio_items().to_string())
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    let tags = client.recommend_tags();
    assert_eq!(tags.pinned[0].id, ALL_SONGS_TAG_ID);
    assert_eq!(tags.pinned[1].id, ALL_PLAYLISTS_TAG_ID);

    let sheets = client.sheets_by_tag(&tags.pinned[0], 1).await.unwrap();
    assert_eq!(sheets.items.len(), 1);
    let sheet: &PlaylistItem = &sheets.items[0];
    let tracks = client.playlist_tracks(sheet, 1).await.unwrap();
    assert!(tracks.is_end);
    assert_eq!(tracks.tracks.len(), 2);
    assert_eq!(tracks.header.unwrap().id, ALL_SONGS_TAG_ID);
    all.assert_async().await;

    let second_page = client.sheets_by_tag(&tags.pinned[0], 2).await.unwrap();
    assert!(second_page.items.is_empty());
}

#[tokio::test]
async fn stream_url_only_for_emby_items() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, 1).await;
    let client = EmbyClient::new(settings(&server.url()), 50);

    let mut item = MusicItem {
        id: "a1".into(),
        title: "Song".into(),
        artist: "Band".into(),
        album: "LP".into(),
        artwork: None,
        duration_secs: None,
        source: ItemSource::EmbyNcmArtwork,
    };
    let url = client.stream_url(&item).await.unwrap().unwrap();
    assert_eq!(url, format!("{}/Audio/a1/stream?static=true&api_key=tok-1", server.url()));

    item.source = ItemSource::NcmImport;
    assert!(client.stream_url(&item).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_unauthorized_searches_share_one_relogin() {
    let mut server = Server::new_async().await;
    let first_login = server
        .mock("POST", "/Users/AuthenticateByName")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"AccessToken": "tok-1", "User": {"Id": "user-1"}}).to_string())
        .expect(1)
        .create_async()
        .await;
    let second_login = server
        .mock("POST", "/Users/AuthenticateByName")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"AccessToken": "tok-2", "User": {"Id": "user-1"}}).to_string())
        .expect(1)
        .create_async()
        .await;
    let _expired = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::Any)
        .match_header("x-emby-authorization", Matcher::Regex("Token=\"tok-1\"".into()))
        .with_status(401)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/Users/user-1/Items")
        .match_query(Matcher::Any)
        .match_header("x-emby-authorization", Matcher::Regex("Token=\"tok-2\"".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(audio_items().to_string())
        .expect(5)
        .create_async()
        .await;

    let client = EmbyClient::new(settings(&server.url()), 50);
    let results = futures::future::join_all((0..5).map(|_| client.search_tracks("Song Band", 5))).await;
    for r in results {
        assert_eq!(r.unwrap().items.len(), 2);
    }
    first_login.assert_async().await;
    second_login.assert_async().await;
    fresh.assert_async().await;
}
