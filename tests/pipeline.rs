//! End-to-end pipeline tests through the public API
//!
//! Records are written with `JsonDirFetcher::store`, turned into subjects,
//! saved, and the files on disk checked.

use alert_subjects::config::{Config, RenderConfig};
use alert_subjects::media::generators_from_config;
use alert_subjects::{
    DataFetcher, FetchError, ImageTriplet, JsonDirFetcher, JsonLocation, MediaGenerator, ObjectId,
    ObjectRecord, Observation, PanelImageLocation, SaveState, Stamp, SubjectGenerator,
    TripletImageLocation,
};

fn render() -> RenderConfig {
    RenderConfig {
        scale: 2,
        ..RenderConfig::default()
    }
}

fn record(id: &str, with_triplet: bool) -> ObjectRecord {
    let mut record = ObjectRecord::new(id)
        .with_observation(Observation::new(60002.0, 150.0, "r", 4.0))
        .with_observation(Observation::new(60001.0, 120.0, "g", 3.0));
    if with_triplet {
        let ramp: Vec<f32> = (0..64).map(|v| v as f32).collect();
        record = record.with_triplet(ImageTriplet {
            time: 60002.0,
            source_id: Some("7".to_string()),
            science: Stamp::new(8, 8, ramp.clone()).unwrap(),
            template: Stamp::filled(8, 8, 10.0),
            difference: Stamp::new(8, 8, ramp).unwrap(),
        });
    }
    record
}

#[test]
fn test_pipeline_saves_every_role() {
    let records = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fetcher = JsonDirFetcher::new(records.path());
    fetcher.store(&record("ZTF24aaa", true)).unwrap();
    fetcher.store(&record("ZTF24bbb", true)).unwrap();

    let config = Config {
        output_dir: output.path().to_path_buf(),
        generators: vec!["triplet".into(), "science".into(), "json".into()],
        render: render(),
        ..Config::default()
    };
    let generators = generators_from_config(&config).unwrap();
    let subjects: Vec<_> = SubjectGenerator::new(["ZTF24aaa", "missing", "ZTF24bbb"], fetcher, generators)
        .unwrap()
        .collect();

    assert_eq!(subjects.len(), 2);
    for (mut subject, index) in subjects.into_iter().zip([1, 3]) {
        assert_eq!(subject.index(), index);
        let report = subject.save(&config.output_dir);
        assert!(report.is_complete());
        assert_eq!(subject.save_state(), SaveState::Saved);

        let triplet = image::open(subject.saved_path("triplet").unwrap()).unwrap();
        assert_eq!(triplet.width(), 3 * 16 + 2 * render().border);
        assert_eq!(triplet.height(), 16);

        let science = image::open(subject.saved_path("science").unwrap()).unwrap();
        assert_eq!((science.width(), science.height()), (16, 16));

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(subject.saved_path("json").unwrap()).unwrap())
                .unwrap();
        // g comes first once sorted by time
        assert_eq!(json["data"][0]["seriesData"][0]["band"], "g");
        assert_eq!(json["data"][1]["seriesData"][0]["y"], 150.0);

        let manifest = subject.manifest();
        assert_eq!(manifest.locations.len(), 3);
        assert!(manifest.missing_roles.is_empty());
    }

    let mut names: Vec<String> = std::fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "ZTF24aaa_0001_json.json",
            "ZTF24aaa_0001_science.png",
            "ZTF24aaa_0001_triplet.png",
            "ZTF24bbb_0003_json.json",
            "ZTF24bbb_0003_science.png",
            "ZTF24bbb_0003_triplet.png",
        ]
    );
}

#[test]
fn test_missing_triplet_only_drops_image_roles() {
    let fetch = |id: &ObjectId| -> Result<ObjectRecord, FetchError> { Ok(record(id.as_str(), false)) };
    let generators: Vec<Box<dyn MediaGenerator>> = vec![
        Box::new(PanelImageLocation::science(render())),
        Box::new(JsonLocation::default()),
    ];

    let mut generator = SubjectGenerator::new(["a"], fetch, generators).unwrap();
    let subject = generator.next().unwrap();
    assert!(generator.next().is_none());

    assert!(subject.artifact("json").is_some());
    assert!(subject.artifact("science").is_none());
    assert!(subject.failures()["science"].contains("science"));
}

#[test]
fn test_broker_outage_does_not_abort_batch() {
    let fetch = |id: &ObjectId| -> Result<ObjectRecord, FetchError> {
        if id.as_str() == "down" {
            Err(FetchError::Broker {
                object_id: id.to_string(),
                reason: "connection refused".to_string(),
            })
        } else {
            Ok(record(id.as_str(), true))
        }
    };
    assert!(fetch.fetch(&ObjectId::from("x")).is_ok());

    let generators: Vec<Box<dyn MediaGenerator>> = vec![Box::new(TripletImageLocation::new(render()))];
    let mut generator = SubjectGenerator::new(["down", "x", "down", "y"], fetch, generators).unwrap();
    let ids: Vec<String> = generator.by_ref().map(|s| s.object_id().to_string()).collect();

    assert_eq!(ids, vec!["x", "y"]);
    assert_eq!(generator.fetch_failures().len(), 2);
    assert_eq!(generator.fetch_failures()[1].object_id(), "down");
}
