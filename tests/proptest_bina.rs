use std::collections::{HashMap, HashSet};

use binacoco::bina::{to_bina, to_bina_string, MapOptions};
use binacoco::ir::io_voc_xml::read_voc_dir;
use proptest::prelude::*;

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn mapped_references_always_resolve(
        dataset in proptest_helpers::arb_dataset(6, 4, 24),
        id_start in 0u64..3,
        category_id_start in proptest::option::of(0u64..3),
    ) {
        let opts = MapOptions { id_start, category_id_start };
        let doc = to_bina(&dataset, &opts).expect("map dataset");

        let image_ids: HashSet<u64> = doc.images.iter().map(|i| i.id).collect();
        let category_ids: HashSet<u64> = doc.categories.iter().map(|c| c.id).collect();
        for ann in &doc.annotations {
            prop_assert!(image_ids.contains(&ann.image_id), "dangling image {}", ann.image_id);
            prop_assert!(category_ids.contains(&ann.category_id), "dangling category {}", ann.category_id);
        }

        let expected_images: Vec<u64> = (id_start..).take(dataset.images.len()).collect();
        prop_assert_eq!(doc.images.iter().map(|i| i.id).collect::<Vec<_>>(), expected_images);
        let category_start = category_id_start.unwrap_or(id_start);
        let expected_categories: Vec<u64> =
            (category_start..).take(dataset.categories.len()).collect();
        prop_assert_eq!(doc.categories.iter().map(|c| c.id).collect::<Vec<_>>(), expected_categories);
        prop_assert_eq!(doc.annotations.len(), dataset.annotations.len());
    }

    #[test]
    fn mapping_keeps_what_each_annotation_points_at(dataset in proptest_helpers::arb_dataset(5, 5, 20)) {
        let doc = to_bina(&dataset, &MapOptions::default()).expect("map dataset");

        let source_pairs: HashMap<(String, String), usize> = dataset
            .annotations
            .iter()
            .map(|ann| {
                let image = dataset.image(ann.image_id).expect("image exists");
                let category = dataset.category(ann.category_id).expect("category exists");
                (image.file_name.clone(), category.name.clone())
            })
            .fold(HashMap::new(), |mut counts, key| {
                *counts.entry(key).or_default() += 1;
                counts
            });

        let images: HashMap<u64, &str> =
            doc.images.iter().map(|i| (i.id, i.file_name.as_str())).collect();
        let categories: HashMap<u64, &str> =
            doc.categories.iter().map(|c| (c.id, c.name.as_str())).collect();
        let mapped_pairs: HashMap<(String, String), usize> = doc
            .annotations
            .iter()
            .map(|ann| (images[&ann.image_id].to_string(), categories[&ann.category_id].to_string()))
            .fold(HashMap::new(), |mut counts, key| {
                *counts.entry(key).or_default() += 1;
                counts
            });

        prop_assert_eq!(source_pairs, mapped_pairs);
    }

    #[test]
    fn written_document_is_well_formed(dataset in proptest_helpers::arb_dataset(4, 3, 12)) {
        let doc = to_bina(&dataset, &MapOptions::default()).expect("map dataset");
        let json = to_bina_string(&doc).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        let keys: Vec<&str> = value
            .as_object()
            .expect("top-level object")
            .keys()
            .map(String::as_str)
            .collect();
        prop_assert_eq!(keys.len(), 11);
        for ann in value["annotations"].as_array().expect("annotations array") {
            prop_assert_eq!(ann["bbox"].as_array().map(Vec::len), Some(4));
            prop_assert!(ann["area"].as_f64().is_some());
        }
    }

    #[test]
    fn voc_area_is_box_area(
        boxes in proptest::collection::vec((0u32..500, 0u32..500, 1u32..300, 1u32..300), 1..6)
    ) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let mut objects = String::new();
        for (x, y, w, h) in &boxes {
            objects.push_str(&format!(
                "<object><name>tooth</name><bndbox><xmin>{}</xmin><ymin>{}</ymin><xmax>{}</xmax><ymax>{}</ymax></bndbox></object>",
                x, y, x + w, y + h
            ));
        }
        let xml = format!(
            "<annotation><filename>a.jpg</filename><size><width>800</width><height>800</height></size>{objects}</annotation>"
        );
        std::fs::write(temp.path().join("a.xml"), xml).expect("write xml");

        let dataset = read_voc_dir(temp.path(), None).expect("read voc");
        let doc = to_bina(&dataset, &MapOptions::default()).expect("map dataset");
        prop_assert_eq!(doc.annotations.len(), boxes.len());
        for (ann, (_, _, w, h)) in doc.annotations.iter().zip(&boxes) {
            prop_assert_eq!(ann.area, f64::from(*w) * f64::from(*h));
            prop_assert_eq!(ann.iscrowd, 0);
            prop_assert!(ann.segmentation.is_empty());
        }
    }
}
