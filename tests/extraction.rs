mod common;

use boq_sheet::extract::file_info;
use boq_sheet::extract::sheet_names;
use boq_sheet::extract::validate_file;
use boq_sheet::process_excel_file;
use boq_sheet::ConversionError;
use boq_sheet::ConverterKind;
use boq_sheet::ExcelProcessor;
use boq_sheet::ExtractionConfig;
use boq_sheet::ExtractionError;
use boq_sheet::OutputOptions;
use common::cost_sheet;
use common::png_bytes;
use common::product_sheet;
use common::wmf_bytes;
use common::write_xls;
use common::write_xlsx;
use common::SheetFixture;
use std::path::Path;

const IMAGE_COLUMN: &str = "Indicative Image";

fn decoder_only() -> ExtractionConfig {
    ExtractionConfig {
        vector_converters: vec![ConverterKind::ImageDecoder],
        ..ExtractionConfig::default()
    }
}

fn with_output(dir: &Path) -> OutputOptions {
    OutputOptions {
        output_dir: Some(dir.to_path_buf()),
        ..OutputOptions::default()
    }
}

fn image_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.join("imgs"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn extracts_product_table_below_preamble() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(&path, &[product_sheet("BOQ"), cost_sheet("Costs")]);

    let result = ExcelProcessor::default()
        .extract_all_tables_with_images(&path, &OutputOptions::default())
        .unwrap();
    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["BOQ", "Costs"]);

    let boq = &result["BOQ"];
    assert!(!boq.empty);
    assert_eq!(boq.header_row, Some(2));
    assert_eq!(boq.columns, vec!["SN", "Description", "Qty", "Rate", IMAGE_COLUMN]);
    assert_eq!(boq.shape, (3, 5));
    assert_eq!(boq.records[0]["Description"], "LED panel 600x600");
    assert_eq!(boq.records[2]["Rate"], "80");
    assert_eq!(boq.records[0][IMAGE_COLUMN], "");
    assert!(boq.html.starts_with("<table class=\"excel-table\">"));
    assert!(boq.markdown.starts_with("| SN | Description | Qty | Rate | Indicative Image |"));

    let costs = &result["Costs"];
    assert!(costs.empty);
    assert!(costs.records.is_empty());
    assert!(costs.validation_message.as_deref().unwrap().contains("4 of 4 sampled rows"));
}

#[test]
fn joins_raster_images_by_anchor_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(&path, &[product_sheet("BOQ Lighting").with_picture(5, "image1.png", png_bytes())]);

    let options = OutputOptions {
        output_dir: Some(dir.path().join("out")),
        session_id: Some("s1".into()),
        file_id: Some("f1".into()),
    };
    let result = ExcelProcessor::default().extract_all_tables_with_images(&path, &options).unwrap();
    let sheet = &result["BOQ Lighting"];

    assert_eq!(sheet.image_count, 1);
    assert_eq!(sheet.image_rows, 1);
    assert_eq!(sheet.images[&5], vec!["/outputs/s1/f1/imgs/BOQ_Lighting_row5_img0.png"]);
    assert_eq!(sheet.records[0][IMAGE_COLUMN], "");
    let cell = &sheet.records[1][IMAGE_COLUMN];
    assert_eq!(cell.matches("<img ").count(), 1);
    assert!(cell.contains("src=\"/outputs/s1/f1/imgs/BOQ_Lighting_row5_img0.png\""));
    assert_eq!(
        std::fs::read(dir.path().join("out/imgs/BOQ_Lighting_row5_img0.png")).unwrap(),
        png_bytes()
    );
}

#[test]
fn undecodable_vector_image_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    let mut sheet = product_sheet("BOQ").with_picture(7, "image1.wmf", wmf_bytes());
    sheet.rows.push(vec!["4".into(), "Track spot".into(), "8".into(), "60".into(), String::new()]);
    write_xlsx(&path, &[sheet]);

    let result = ExcelProcessor::new(decoder_only())
        .extract_all_tables_with_images(&path, &with_output(dir.path()))
        .unwrap();
    let sheet = &result["BOQ"];

    assert_eq!(sheet.image_count, 0);
    assert!(sheet.images.is_empty());
    assert_eq!(sheet.records.len(), 4);
    assert_eq!(sheet.records[3]["Description"], "Track spot");
    assert_eq!(sheet.records[3][IMAGE_COLUMN], "");
    assert!(image_files(dir.path()).is_empty());
}

#[test]
fn vector_media_is_recovered_from_the_package() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    // A payload the in-process decoder can read, stored under a metafile name.
    write_xlsx(
        &path,
        &[product_sheet("BOQ")
            .with_picture(4, "image1.png", png_bytes())
            .with_picture(4, "image2.wmf", png_bytes())],
    );

    let result = ExcelProcessor::new(decoder_only())
        .extract_all_tables_with_images(&path, &with_output(dir.path()))
        .unwrap();
    let sheet = &result["BOQ"];

    assert_eq!(sheet.images[&4], vec!["imgs/BOQ_row4_img0.png", "imgs/BOQ_row4_wmf_image2.png"]);
    assert_eq!(sheet.image_count, 2);
    let cell = &sheet.records[0][IMAGE_COLUMN];
    assert_eq!(cell.matches("<img ").count(), 2);
    assert_eq!(image_files(dir.path()), vec!["BOQ_row4_img0.png", "BOQ_row4_wmf_image2.png"]);
}

#[test]
fn unreadable_drawing_still_surfaces_vector_media() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(&path, &[product_sheet("BOQ").with_picture(5, "image3.emf", png_bytes()).with_broken_drawing()]);

    let result = ExcelProcessor::new(decoder_only())
        .extract_all_tables_with_images(&path, &with_output(dir.path()))
        .unwrap();
    let sheet = &result["BOQ"];

    assert_eq!(sheet.image_count, 0);
    assert_eq!(sheet.unpositioned_images, vec!["imgs/wmf_image3.png"]);
    assert_eq!(sheet.records.len(), 3);
    assert_eq!(image_files(dir.path()), vec!["wmf_image3.png"]);
}

#[test]
fn unreadable_drawing_relationships_still_surface_vector_media() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(&path, &[product_sheet("BOQ").with_picture(5, "image4.wmf", png_bytes()).with_broken_drawing_rels()]);

    let result = ExcelProcessor::new(decoder_only())
        .extract_all_tables_with_images(&path, &with_output(dir.path()))
        .unwrap();
    let sheet = &result["BOQ"];

    assert_eq!(sheet.image_count, 0);
    assert!(sheet.images.is_empty());
    assert_eq!(sheet.unpositioned_images, vec!["imgs/wmf_image4.png"]);
    assert_eq!(sheet.records.len(), 3);
    assert_eq!(image_files(dir.path()), vec!["wmf_image4.png"]);
}

#[test]
fn image_count_includes_pictures_outside_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    let sheet = product_sheet("BOQ").with_picture(1, "image1.png", png_bytes()).with_picture(5, "image2.png", png_bytes());
    write_xlsx(&path, &[sheet]);

    let result = ExcelProcessor::default()
        .extract_all_tables_with_images(&path, &with_output(dir.path()))
        .unwrap();
    let sheet = &result["BOQ"];

    assert_eq!(sheet.image_count, 2);
    assert_eq!(sheet.image_rows, 1);
    assert_eq!(sheet.images.keys().copied().collect::<Vec<_>>(), vec![1, 5]);
}

#[test]
fn legacy_workbook_matches_modern_equivalent() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("offer.xls");
    let modern = dir.path().join("offer.xlsx");
    write_xls(&legacy, &[product_sheet("BOQ"), cost_sheet("Costs")]);
    write_xlsx(&modern, &[product_sheet("BOQ"), cost_sheet("Costs")]);

    let processor = ExcelProcessor::default();
    let from_legacy = processor.extract_all_tables_with_images(&legacy, &OutputOptions::default()).unwrap();
    let from_modern = processor.extract_all_tables_with_images(&modern, &OutputOptions::default()).unwrap();

    assert!(dir.path().join("offer_converted.xlsx").is_file());
    assert!(legacy.is_file());
    let products = |result: &boq_sheet::ExtractionResult| result.values().filter(|sheet| !sheet.empty).count();
    assert_eq!(products(&from_legacy), 1);
    assert_eq!(products(&from_legacy), products(&from_modern));
    assert_eq!(from_legacy["BOQ"].records, from_modern["BOQ"].records);
    assert!(from_legacy["Costs"].empty);
}

#[test]
fn corrupt_legacy_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.xls");
    std::fs::write(&path, vec![0x42u8; 1024]).unwrap();

    let error = ExcelProcessor::default()
        .extract_all_tables_with_images(&path, &OutputOptions::default())
        .err()
        .unwrap();
    assert!(matches!(error, ExtractionError::Conversion(ConversionError::Corrupt)));
    assert!(error.to_string().starts_with("The .xls file format is not valid or corrupted."));
}

#[test]
fn repeated_extraction_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(&path, &[product_sheet("BOQ").with_picture(6, "image1.png", png_bytes())]);

    let processor = ExcelProcessor::default();
    let first = processor.extract_all_tables_with_images(&path, &with_output(dir.path())).unwrap();
    let second = processor.extract_all_tables_with_images(&path, &with_output(dir.path())).unwrap();
    assert_eq!(first, second);
    assert_eq!(second["BOQ"].images[&6].len(), 1);
}

#[test]
fn sheet_patterns_restrict_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(&path, &[cost_sheet("Costs"), product_sheet("BOQ - Power")]);

    let config = ExtractionConfig {
        sheet_patterns: vec!["BOQ*".into()],
        ..ExtractionConfig::default()
    };
    let result = ExcelProcessor::new(config)
        .extract_all_tables_with_images(&path, &OutputOptions::default())
        .unwrap();
    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["BOQ - Power"]);
}

#[test]
fn reports_whole_file_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offer.xlsx");
    write_xlsx(
        &path,
        &[
            product_sheet("BOQ").with_picture(4, "image1.png", png_bytes()),
            cost_sheet("Costs"),
            SheetFixture::new("Notes", &[]),
        ],
    );

    let report = process_excel_file(&path, &with_output(&dir.path().join("out")));
    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.sheet_count, 1);
    assert_eq!(report.image_count, 1);
    assert_eq!(report.message.as_deref(), Some("Successfully extracted 1 sheet(s) with 1 image(s)"));
    assert!(report.sheets["Notes"].empty);
    assert_eq!(report.sheets["Notes"].html, "<p>No data found</p>");

    let info = report.file_info.as_ref().unwrap();
    assert_eq!(info.filename, "offer.xlsx");
    assert_eq!(info.extension, ".xlsx");
    assert_eq!(info.sheet_names, vec!["BOQ", "Costs", "Notes"]);

    let json: serde_json::Value = serde_json::from_str(&report.to_json(true).unwrap()).unwrap();
    assert_eq!(json["sheets"]["BOQ"]["records"][0]["SN"], "1");
    assert_eq!(json["sheets"]["BOQ"]["shape"], serde_json::json!([3, 5]));
    assert!(json.get("error").is_none());
}

#[test]
fn metadata_helpers_read_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("offer.xls");
    write_xls(&legacy, &[product_sheet("BOQ"), cost_sheet("Costs")]);
    let modern = dir.path().join("offer.xlsm");
    write_xlsx(&modern, &[product_sheet("Main")]);

    assert_eq!(sheet_names(&legacy).unwrap(), vec!["BOQ", "Costs"]);
    assert_eq!(sheet_names(&modern).unwrap(), vec!["Main"]);
    validate_file(&legacy).unwrap();
    validate_file(&modern).unwrap();

    let info = file_info(&legacy).unwrap();
    assert_eq!(info.extension, ".xls");
    assert_eq!(info.sheet_count, 2);
    assert!(info.size_bytes >= 4096);
    assert!(!dir.path().join("offer_converted.xlsx").exists());

    let missing = dir.path().join("missing.xlsx");
    assert!(matches!(validate_file(&missing), Err(ExtractionError::FileNotFound(_))));
}
