use chrono::{NaiveDate, TimeZone, Utc};
use flathunt_core::error::AppError;
use flathunt_core::models::{Advert, RawMessage, TextEntity};
use flathunt_core::pipeline::{IngestService, Outcome, TracingReporter};
use flathunt_core::testutil::{MockPublisher, MockRenderer};
use flathunt_core::traits::{AdvertStore, RenderedPage};
use flathunt_core::{EnrichmentResolver, FilterConfig, PipelineConfig, extract_fields};
use flathunt_db::AdvertRepository;

use crate::integration::common::setup_test_db;

fn advert(url: &str) -> Advert {
    Advert {
        url: url.into(),
        source_message_id: 42,
        district: Some("Mokotów".into()),
        price: Some(5000.0),
        media_fee: Some(300.0),
        deposit: None,
        rooms: Some(3),
        area: Some(60.0),
        posted_at: NaiveDate::from_ymd_opt(2024, 9, 1)
            .and_then(|d| d.and_hms_opt(10, 15, 0)),
        year_built: Some(2015),
        no_animals: true,
        animals_mentioned: None,
    }
}

#[tokio::test]
async fn insert_and_read_back_by_url() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    let original = advert("https://www.otodom.pl/pl/oferta/a");
    let id = repo.insert(&original).await.unwrap();
    assert!(!id.is_nil());

    let stored = repo
        .get_by_url("https://www.otodom.pl/pl/oferta/a")
        .await
        .unwrap()
        .expect("advert should be stored");

    assert_eq!(stored.id, id);
    assert_eq!(stored.advert, original);
}

#[tokio::test]
async fn exists_tracks_inserted_urls() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    assert!(!repo.exists("https://www.olx.pl/a").await.unwrap());
    repo.insert(&advert("https://www.olx.pl/a")).await.unwrap();
    assert!(repo.exists("https://www.olx.pl/a").await.unwrap());
    assert!(!repo.exists("https://www.olx.pl/b").await.unwrap());
}

#[tokio::test]
async fn second_insert_of_same_url_is_uniqueness_violation() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    repo.insert(&advert("https://www.olx.pl/a")).await.unwrap();
    let err = AdvertStore::insert(&repo, &advert("https://www.olx.pl/a"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UniquenessViolation(ref url) if url == "https://www.olx.pl/a"));
    assert!(err.is_duplicate());
}

#[tokio::test]
async fn absent_fields_round_trip_as_null() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    let sparse = Advert {
        district: None,
        price: None,
        media_fee: None,
        rooms: None,
        area: None,
        posted_at: None,
        year_built: None,
        no_animals: false,
        animals_mentioned: Some("bez zwierząt domowych".into()),
        ..advert("https://www.olx.pl/sparse")
    };
    repo.insert(&sparse).await.unwrap();

    let stored = repo.get_by_url(&sparse.url).await.unwrap().unwrap();
    assert_eq!(stored.advert, sparse);
}

#[tokio::test]
async fn list_recent_is_newest_first_and_limited() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    for i in 0..3 {
        repo.insert(&advert(&format!("https://www.olx.pl/{i}")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let recent = repo.list_recent(2).await.unwrap();
    let urls: Vec<_> = recent.iter().map(|s| s.advert.url.as_str()).collect();
    assert_eq!(urls, ["https://www.olx.pl/2", "https://www.olx.pl/1"]);
}

#[tokio::test]
async fn list_recent_accepts_unbounded_limit() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    repo.insert(&advert("https://www.olx.pl/only")).await.unwrap();

    let recent = repo.list_recent(usize::MAX).await.unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn long_hashtag_district_is_stored_verbatim() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    let district = "Ś".repeat(150);
    let fields = extract_fields(&format!("📍 Район: #{district}\n💰 Цена: 3600 zł"));
    assert_eq!(fields.district.as_deref(), Some(district.as_str()));

    let long = Advert::from_fields("https://www.olx.pl/long", 9, fields);
    AdvertStore::insert(&repo, &long).await.unwrap();

    let stored = repo.get_by_url("https://www.olx.pl/long").await.unwrap().unwrap();
    assert_eq!(stored.advert.district, Some(district));
}

#[tokio::test]
async fn get_by_url_unknown_is_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);

    assert!(repo.get_by_url("https://nowhere").await.unwrap().is_none());
    repo.health_check().await.unwrap();
}

#[tokio::test]
async fn pipeline_persists_once_and_delivers_once() {
    let (pool, _container) = setup_test_db().await;
    let repo = AdvertRepository::new(pool);
    let publisher = MockPublisher::new();
    let renderer = MockRenderer::new(RenderedPage {
        script_result: Some("Mieszkanie bez zwierząt, wolne od zaraz".into()),
        content: String::new(),
    });

    let service = IngestService::new(
        repo.clone(),
        EnrichmentResolver::new(renderer),
        FilterConfig::default().build_chain(),
        publisher.clone(),
        PipelineConfig::new(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(), -100_200),
    );

    let message = RawMessage {
        id: 7,
        text: "📍 Район: #Mokotów\n💰 Цена: 5000 zł [+300 zł]\n🔢 Комнаты: #3_комнаты\n\
               〽 Площадь: 60.0 м²\n📆 01/09/2024 | 10:15"
            .into(),
        entities: vec![TextEntity::TextLink {
            url: "https://www.olx.pl/d/oferta/m".into(),
        }],
        media: None,
        sent_at: Utc.with_ymd_and_hms(2024, 9, 1, 8, 15, 0).unwrap(),
    };

    let first = service.process(&message, &TracingReporter).await.unwrap();
    let second = service.process(&message, &TracingReporter).await.unwrap();

    assert!(matches!(first, Outcome::Delivered(_)));
    assert_eq!(second, Outcome::SkippedDuplicate);
    assert_eq!(publisher.sent.lock().unwrap().len(), 1);

    let stored = repo
        .get_by_url("https://www.olx.pl/d/oferta/m")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.advert.source_message_id, 7);
    assert_eq!(stored.advert.rooms, Some(3));
    assert!(stored.advert.no_animals);
}
