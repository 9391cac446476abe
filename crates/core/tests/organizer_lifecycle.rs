//! Document reorganizer integration tests.
//!
//! These tests run the reorganizer over converted trees:
//! - Grouping records into slug folders
//! - Metadata document layout
//! - Chaining conversion, reorganization and packing

use std::fs::File;

use tempfile::TempDir;

use leggio_core::{
    organizer::{METADATA_FILE, ORGANIZED_DIR},
    testing::{fixtures, MockConverter},
    ArchivePacker, AssetPipeline, CsvMapping, DocumentReorganizer, OrganizerConfig, PackSource,
    PipelineConfig, RunOptions, ZipArchiveBuilder,
};

fn mapping() -> CsvMapping {
    CsvMapping::from_json_str(
        r#"{
            "document": {
                "identifier": "identifier",
                "groupBy": "groupBy",
                "title": "groupBy",
                "description": "description"
            },
            "image": {
                "code": "identifier",
                "page": "page"
            }
        }"#,
    )
    .expect("Failed to parse mapping")
}

#[tokio::test]
async fn test_three_rows_one_folder_two_images() {
    let assets = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fixtures::write_file(&assets.path().join("Fondo/1_1_1.webp"), 10);
    fixtures::write_file(&assets.path().join("Fondo/1_1_2.webp"), 10);
    let table = assets.path().join("meta.csv");
    fixtures::write_csv(
        &table,
        "identifier,groupBy,description,page",
        &[
            "1_1_1,Fondo A,Primo,1",
            "1_1_1,Fondo A,Primo,1",
            "1_1_2,Fondo A,Primo,2",
        ],
    );

    let reorganizer = DocumentReorganizer::new(OrganizerConfig::default());
    let summary = reorganizer
        .organize(&table, assets.path(), output.path(), &mapping(), None)
        .await
        .expect("Reorganization failed");

    assert_eq!(summary.total_records, 3);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.folders, vec!["fondo-a"]);

    let organized = output.path().join(ORGANIZED_DIR);
    assert_eq!(
        fixtures::list_files(&organized),
        vec![
            "fondo-a/fondo-a_1_1_1.webp",
            "fondo-a/fondo-a_1_1_2.webp",
            "fondo-a/metadata.json",
        ]
    );

    let metadata: serde_json::Value = serde_json::from_slice(
        &std::fs::read(organized.join("fondo-a").join(METADATA_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["document"]["title"], "Fondo A");
    assert_eq!(metadata["document"]["description"], "Primo");
    let images = metadata["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["code"], "1_1_1");
    assert_eq!(images[1]["page"], "2");
}

#[tokio::test]
async fn test_groups_that_slug_alike_merge() {
    let assets = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fixtures::write_file(&assets.path().join("a.webp"), 10);
    fixtures::write_file(&assets.path().join("b.webp"), 10);
    let table = assets.path().join("meta.csv");
    fixtures::write_csv(
        &table,
        "identifier,groupBy,description,page",
        &["a,Fondo A,,1", "b,fondo  a!,,2"],
    );

    let summary = DocumentReorganizer::new(OrganizerConfig::default())
        .organize(&table, assets.path(), output.path(), &mapping(), None)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.folders, vec!["fondo-a"]);
}

#[tokio::test]
async fn test_convert_organize_pack() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fixtures::write_file(&input.path().join("Busta 1/1_1_1.jpg"), 500);
    fixtures::write_file(&input.path().join("Busta 1/1_1_2.jpg"), 500);
    fixtures::write_file(&input.path().join("Busta 2/2_1_1.jpg"), 500);

    let pipeline = AssetPipeline::new(PipelineConfig::default(), MockConverter::new());
    let converted = pipeline
        .run(input.path(), output.path(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(converted.converted, 3);

    let table = input.path().join("meta.csv");
    fixtures::write_csv(
        &table,
        "identifier,groupBy,description,page",
        &[
            "1_1_1,Lettere,,1",
            "1_1_2,Lettere,,2",
            "2_1_1,Mappe,,1",
        ],
    );
    let organized = DocumentReorganizer::new(OrganizerConfig::default())
        .organize(&table, output.path(), output.path(), &mapping(), None)
        .await
        .unwrap();
    assert_eq!(organized.processed, 3);
    assert_eq!(organized.missing_thumbnails, 0);

    let archive = output.path().join("fondo.zip");
    let sources = PackSource::organized_layout(output.path(), "thumbnails");
    let parts = ArchivePacker::new(ZipArchiveBuilder::default())
        .pack(&sources, &archive, 1 << 30)
        .await
        .unwrap()
        .parts;
    assert_eq!(parts.len(), 1);
    assert!(!parts[0].oversize);

    let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    let mut names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    assert!(names.contains(&"lettere/lettere_1_1_1.webp".to_string()));
    assert!(names.contains(&"mappe/metadata.json".to_string()));
    assert!(names.contains(&"thumbnails/lettere/lettere_1_1_2_gallery.webp".to_string()));
    assert!(names.contains(&"thumbnails/mappe/mappe_2_1_1_low_quality.webp".to_string()));
}
