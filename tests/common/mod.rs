#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

/// Writes a zip archive with the given `(entry name, contents)` pairs.
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = File::create(path).expect("create zip file");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, contents) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(contents).expect("write zip entry");
    }
    zip.finish().expect("finish zip");
}

/// A VOC annotation document; objects are `(name, [xmin, ymin, xmax, ymax])`.
pub fn voc_xml(filename: &str, width: u32, height: u32, objects: &[(&str, [f64; 4])]) -> Vec<u8> {
    let mut xml = format!(
        "<annotation>\n  <folder>images</folder>\n  <filename>{filename}</filename>\n  \
         <size>\n    <width>{width}</width>\n    <height>{height}</height>\n    <depth>3</depth>\n  </size>\n"
    );
    for (name, [xmin, ymin, xmax, ymax]) in objects {
        xml.push_str(&format!(
            "  <object>\n    <name>{name}</name>\n    <pose>Unspecified</pose>\n    \
             <truncated>0</truncated>\n    <difficult>0</difficult>\n    <bndbox>\n      \
             <xmin>{xmin}</xmin>\n      <ymin>{ymin}</ymin>\n      <xmax>{xmax}</xmax>\n      \
             <ymax>{ymax}</ymax>\n    </bndbox>\n  </object>\n"
        ));
    }
    xml.push_str("</annotation>\n");
    xml.into_bytes()
}

/// The dental VOC dataset the golden output was produced from.
pub fn write_voc_archive(path: &Path) {
    write_zip(
        path,
        &[
            ("dental/images/img_a.jpg", b"not really a jpeg".to_vec()),
            ("dental/images/img_b.jpg", b"not really a jpeg".to_vec()),
            (
                "dental/annotations/img_a.xml",
                voc_xml(
                    "img_a.jpg",
                    640,
                    480,
                    &[
                        ("caries", [10.0, 20.0, 110.0, 70.0]),
                        ("molar", [200.0, 150.0, 300.0, 300.5]),
                    ],
                ),
            ),
            (
                "dental/annotations/img_b.xml",
                voc_xml("img_b.jpg", 800, 600, &[("molar", [0.0, 0.0, 50.0, 40.0])]),
            ),
            ("__MACOSX/dental/._img_a.xml", b"resource fork".to_vec()),
        ],
    );
}

/// Two COCO files whose image and annotation IDs collide.
pub fn write_coco_archive(path: &Path) {
    let first = r#"{
        "images": [
            {"id": 5, "file_name": "scan_5.png", "width": 320, "height": 240},
            {"id": 7, "file_name": "scan_7.png", "width": 320, "height": 240}
        ],
        "categories": [{"id": 3, "name": "tooth", "supercategory": "dental"}],
        "annotations": [
            {"id": 1, "image_id": 5, "category_id": 3,
             "segmentation": [[10, 10, 50, 10, 50, 40, 10, 40]], "iscrowd": 0},
            {"id": 2, "image_id": 7, "category_id": 3, "bbox": [1, 2, 30, 40],
             "segmentation": {"counts": [0, 4, 2], "size": [240, 320]}, "iscrowd": 1, "area": 99.5}
        ]
    }"#;
    let second = r#"{
        "images": [{"id": 5, "file_name": "extra/scan_9.png", "width": 100, "height": 100}],
        "categories": [
            {"id": 1, "name": "crown"},
            {"id": 2, "name": "tooth", "supercategory": "dental"}
        ],
        "annotations": [
            {"id": 1, "image_id": 5, "category_id": 1, "bbox": [0, 0, 10, 10]},
            {"id": 2, "image_id": 5, "category_id": 2, "bbox": [20, 20, 10, 5]}
        ]
    }"#;
    write_zip(
        path,
        &[
            ("export/a_coco.json", first.as_bytes().to_vec()),
            ("export/b_coco.json", second.as_bytes().to_vec()),
            ("export/scan_5.png", b"png".to_vec()),
            ("export/scan_7.png", b"png".to_vec()),
        ],
    );
}

/// A Roboflow-style YOLO export with a root `data.yaml`.
pub fn write_yolo_archive(path: &Path) {
    write_zip(
        path,
        &[
            ("data.yaml", b"train: ../train/images\nnc: 2\nnames: ['cavity', 'filling']\n".to_vec()),
            ("train/images/a.bmp", bmp_bytes(100, 50)),
            ("train/images/b.bmp", bmp_bytes(40, 40)),
            (
                "train/labels/a.txt",
                b"0 0.5 0.5 0.2 0.4\n1 0.25 0.25 0.1 0.1\n".to_vec(),
            ),
        ],
    );
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
