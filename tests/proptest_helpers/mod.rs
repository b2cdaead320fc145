#![allow(dead_code)]

use std::collections::BTreeSet;

use binacoco::ir::{Annotation, BBoxXYXY, Category, Dataset, Image, Pixel};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

fn image_file_name_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z]{1,6})?\\.(jpg|png)"
}

fn category_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,11}"
}

/// Sparse, unordered IDs like the ones COCO exports carry.
fn sparse_ids(count: usize) -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::btree_set(0u64..10_000, count..=count)
        .prop_map(|ids: BTreeSet<u64>| ids.into_iter().rev().collect())
}

type AnnSeed = (usize, usize, u32, u32, u32, u32);

fn bbox_from_seed(width: u32, height: u32, seed: AnnSeed) -> BBoxXYXY<Pixel> {
    let (_, _, a, b, c, d) = seed;
    let (w, h) = (f64::from(width), f64::from(height));
    let x1 = f64::from(a % width);
    let x2 = f64::from(b % width);
    let y1 = f64::from(c % height);
    let y2 = f64::from(d % height);
    BBoxXYXY::from_xyxy(x1.min(x2), y1.min(y2), x1.max(x2).min(w), y1.max(y2).min(h))
}

/// A dataset whose references all resolve, with sparse IDs in every list.
pub fn arb_dataset(max_images: usize, max_cats: usize, max_anns: usize) -> BoxedStrategy<Dataset> {
    assert!(max_images > 0, "max_images must be > 0");
    assert!(max_cats > 0, "max_cats must be > 0");

    (1usize..=max_images, 1usize..=max_cats, 0usize..=max_anns)
        .prop_flat_map(|(image_count, category_count, ann_count)| {
            (
                sparse_ids(image_count),
                proptest::collection::vec(
                    (image_file_name_strategy(), 2u32..=4096, 2u32..=4096),
                    image_count..=image_count,
                ),
                sparse_ids(category_count),
                proptest::collection::vec(category_name_strategy(), category_count..=category_count),
                sparse_ids(ann_count),
                proptest::collection::vec(
                    (
                        any::<usize>(),
                        any::<usize>(),
                        any::<u32>(),
                        any::<u32>(),
                        any::<u32>(),
                        any::<u32>(),
                    ),
                    ann_count..=ann_count,
                ),
            )
        })
        .prop_map(
            |(image_ids, image_specs, category_ids, category_names, ann_ids, ann_seeds)| {
                let images: Vec<Image> = image_ids
                    .iter()
                    .zip(image_specs)
                    .map(|(id, (file_name, w, h))| Image::new(*id, file_name, w, h))
                    .collect();
                let categories: Vec<Category> = category_ids
                    .iter()
                    .zip(category_names)
                    .map(|(id, name)| Category::new(*id, name))
                    .collect();
                let annotations = ann_ids
                    .iter()
                    .zip(ann_seeds)
                    .map(|(id, seed)| {
                        let image = &images[seed.0 % images.len()];
                        let category = &categories[seed.1 % categories.len()];
                        let bbox = bbox_from_seed(image.width, image.height, seed);
                        Annotation::new(*id, image.id, category.id, bbox)
                    })
                    .collect();

                Dataset {
                    images,
                    categories,
                    annotations,
                }
            },
        )
        .boxed()
}
