use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geolr::core::schema::DESCRIPTORS;
use geolr::io::tile_info::{WeatherStats, read_tile_records, write_tile_records};
use geolr::{
    BuildParams, DatasetPaths, DatasetStore, Error, ImagingMode, MemoryRasters, MergeInput,
    Modality, PipelineParams, RechunkParams, StatsParams, StoreLayout, TileRecord, TileRecords,
    build_store, compute_band_stats, merge_stores, post_download_with_source, rechunk_store,
};
use ndarray::{Array3, Axis};

const SIZE: usize = 2;
const S2: [&str; 14] = [
    "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8A", "B8", "B9", "B10", "B11", "B12", "QA60",
];

fn record(mode: Option<ImagingMode>, with_s1: bool) -> TileRecord {
    let mut bands: HashMap<String, Option<Vec<String>>> = HashMap::new();
    bands.insert(
        "sentinel2".into(),
        Some(S2.iter().map(|s| s.to_string()).collect()),
    );
    bands.insert(
        "sentinel1_asc".into(),
        with_s1.then(|| vec!["VV".to_string(), "VH".to_string()]),
    );
    TileRecord {
        s2_date: "2020-06-15".into(),
        s2_type: mode,
        crs: None,
        lat: 30.0,
        lon: 60.0,
        biome: 1,
        eco_region: 10,
        no_data: false,
        bands,
        era5: None,
    }
}

/// Every channel of the raster holds `value`
fn raster(channels: usize, side: usize, value: f64) -> ndarray::ArrayD<f64> {
    Array3::from_elem((side, side, channels), value).into_dyn()
}

/// Tiles `t0..tn`, alternating l1c (value 1) and l2a (value 100)
fn dataset(n: usize) -> (TileRecords, MemoryRasters) {
    let mut records = TileRecords::new();
    let mut rasters = MemoryRasters::default();
    for i in 0..n {
        let (mode, value) = if i % 2 == 0 {
            (ImagingMode::L1c, 1.0)
        } else {
            (ImagingMode::L2a, 100.0)
        };
        let id = format!("t{i}");
        let r = record(Some(mode), true);
        rasters.insert(&id, raster(r.expected_channels(), SIZE + 2, value));
        records.push((id, r));
    }
    (records, rasters)
}

fn params() -> BuildParams {
    BuildParams {
        image_size: SIZE,
        layout: StoreLayout::default(),
    }
}

#[test]
fn every_row_has_the_declared_shape_and_type() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (records, rasters) = dataset(3);
    let report = build_store(&rasters, &records, &out, &params()).unwrap();
    assert_eq!(report.admitted, 3);
    assert_eq!(report.written, 3);

    let store = DatasetStore::open(&out).unwrap();
    assert_eq!(store.rows(), 3);
    for row in 0..store.rows() {
        for desc in DESCRIPTORS.iter() {
            let t = store.read_tensor(desc.modality, row).unwrap();
            assert_eq!(t.shape(), desc.row_shape(SIZE).as_slice(), "{}", desc.modality);
            assert_eq!(t.element_type(), desc.element, "{}", desc.modality);
        }
    }
}

#[test]
fn rows_line_up_across_arrays() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (records, rasters) = dataset(4);
    build_store(&rasters, &records, &out, &params()).unwrap();

    let store = DatasetStore::open(&out).unwrap();
    for (row, (id, record)) in records.iter().enumerate() {
        let meta = store.read_metadata(row).unwrap();
        assert_eq!(&meta.tile_id, id);
        assert_eq!(meta.mode(), record.s2_type);
        let expected = if row % 2 == 0 { 1.0 } else { 100.0 };
        let s2 = store.read_tensor(Modality::Sentinel2, row).unwrap().to_f64();
        assert!(s2.iter().all(|v| *v == expected));
        let s1 = store.read_tensor(Modality::Sentinel1, row).unwrap().to_f64();
        assert_eq!(s1.index_axis(Axis(0), 0)[[0, 0]], expected);
        assert_eq!(s1.index_axis(Axis(0), 2)[[0, 0]], f64::NEG_INFINITY);
        // no era5 block in these records
        let era5 = store.read_tensor(Modality::Era5, row).unwrap().to_f64();
        assert!(era5.iter().all(|v| *v == f64::INFINITY));
    }
}

#[test]
fn a_channel_off_by_one_drops_exactly_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let (records, rasters) = dataset(4);
    let clean = build_store(&rasters, &records, &dir.path().join("a.zarr"), &params()).unwrap();

    let mut corrupted = rasters.clone();
    let channels = records[1].1.expected_channels() + 1;
    corrupted.insert("t1", raster(channels, SIZE + 2, 100.0));
    let report =
        build_store(&corrupted, &records, &dir.path().join("b.zarr"), &params()).unwrap();

    assert_eq!(report.admitted, clean.admitted - 1);
    assert_eq!(report.mismatched, 1);
    let store = DatasetStore::open(&dir.path().join("b.zarr")).unwrap();
    assert_eq!(store.rows(), 3);
    let ids: Vec<_> = (0..3)
        .map(|r| store.read_metadata(r).unwrap().tile_id)
        .collect();
    assert_eq!(ids, vec!["t0", "t2", "t3"]);
}

#[test]
fn unreadable_and_undersized_rasters_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (records, mut rasters) = dataset(3);
    rasters.tiles.remove("t0");
    let channels = records[2].1.expected_channels();
    rasters.insert("t2", raster(channels, SIZE - 1, 1.0));

    let report = build_store(&rasters, &records, &dir.path().join("ds.zarr"), &params()).unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.admitted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.written, 1);
}

#[test]
fn constant_full_pass_band_has_zero_spread() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (records, rasters) = dataset(5);
    build_store(&rasters, &records, &out, &params()).unwrap();

    let store = DatasetStore::open(&out).unwrap();
    let stats =
        geolr::core::stats::compute_band_stats(&store, &records, &StatsParams::default()).unwrap();
    let lon = &stats["lon"];
    let v = store.read_tensor(Modality::Lon, 0).unwrap().to_f64()[[0]];
    assert_eq!(lon.mean[0], Some(v));
    assert_eq!(lon.std[0], Some(0.0));
    assert_eq!(lon.min[0], Some(v));
    assert_eq!(lon.max[0], Some(v));
    // one-hot and categorical modalities are skipped
    assert!(!stats.contains_key("biome"));
    assert!(!stats.contains_key("sentinel2_scl"));
}

#[test]
fn mode_split_statistics_only_see_their_own_rows() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (records, rasters) = dataset(24);
    build_store(&rasters, &records, &out, &params()).unwrap();

    let store = DatasetStore::open(&out).unwrap();
    let stats =
        geolr::core::stats::compute_band_stats(&store, &records, &StatsParams::default()).unwrap();
    let l1c = &stats["sentinel2_l1c"];
    let l2a = &stats["sentinel2_l2a"];
    for c in 0..13 {
        assert_eq!(l1c.mean[c], Some(1.0));
        assert_eq!(l2a.mean[c], Some(100.0));
        assert_eq!(l1c.std[c], Some(0.0));
        assert_eq!(l2a.max[c], Some(100.0));
    }
    assert!(stats.contains_key("sentinel2_cloudmask_l2a"));
    // sentinel1 has no mode split; its HH/HV channels are never observed
    assert!(!stats.contains_key("sentinel1_l1c"));
    assert_eq!(stats["sentinel1"].mean[2], None);
}

#[test]
fn statistics_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (records, rasters) = dataset(9);
    build_store(&rasters, &records, &out, &params()).unwrap();

    let params = StatsParams {
        subset_size: 5,
        seed: 7,
    };
    let store = DatasetStore::open(&out).unwrap();
    let a = geolr::core::stats::compute_band_stats(&store, &records, &params).unwrap();
    let b = geolr::core::stats::compute_band_stats(&store, &records, &params).unwrap();
    assert_eq!(a, b);
}

#[test]
fn rechunked_store_reads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("ds.zarr");
    let dst = dir.path().join("ds_chunked.zarr");
    let (records, rasters) = dataset(5);
    build_store(&rasters, &records, &src, &params()).unwrap();

    let rechunk = RechunkParams {
        layout: StoreLayout {
            chunk_rows: 2,
            gzip_level: 9,
        },
    };
    let summary = rechunk_store(&src, &dst, &rechunk).unwrap();
    assert_eq!(summary.tile_count, 5);

    let a = DatasetStore::open(&src).unwrap();
    let b = DatasetStore::open(&dst).unwrap();
    assert_eq!(a.image_size(), b.image_size());
    for row in 0..a.rows() {
        assert_eq!(a.read_metadata(row).unwrap(), b.read_metadata(row).unwrap());
        for m in Modality::ALL {
            assert_eq!(a.read_tensor(m, row).unwrap(), b.read_tensor(m, row).unwrap());
        }
    }
    assert!(rechunk_store(&src, &src, &rechunk).is_err());
}

fn write_records(path: &Path, records: &TileRecords) {
    write_tile_records(path, records).unwrap();
}

#[test]
fn an_aliased_output_never_replaces_its_input() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("ds.zarr");
    let (records, rasters) = dataset(2);
    build_store(&rasters, &records, &src, &params()).unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let aliases = [
        dir.path().join("sub").join("..").join("ds.zarr"),
        dir.path().to_path_buf(),
    ];
    for alias in &aliases {
        assert!(matches!(
            rechunk_store(&src, alias, &RechunkParams::default()),
            Err(Error::InvalidArgument { .. })
        ));
    }

    let tile_info = dir.path().join("ds_tile_info.json");
    write_records(&tile_info, &records);
    let other = dir.path().join("other.zarr");
    build_store(&rasters, &records, &other, &params()).unwrap();
    let first = MergeInput {
        store: src.clone(),
        tile_info: tile_info.clone(),
    };
    let second = MergeInput {
        store: other,
        tile_info,
    };
    assert!(matches!(
        merge_stores(
            &first,
            &second,
            &aliases[0],
            &dir.path().join("merged_tile_info.json"),
            &RechunkParams::default()
        ),
        Err(Error::InvalidArgument { .. })
    ));

    let store = DatasetStore::open(&src).unwrap();
    assert_eq!(store.read_metadata(1).unwrap().tile_id, "t1");
    let s2 = store.read_tensor(Modality::Sentinel2, 0).unwrap().to_f64();
    assert!(s2.iter().all(|v| *v == 1.0));
}

#[test]
fn statistics_overflow_aborts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let tile_info = dir.path().join("tile_info.json");
    let stats_out = dir.path().join("band_stats.json");
    let (records, mut rasters) = dataset(2);
    // too large for f32 sentinel1 storage
    let channels = records[0].1.expected_channels();
    rasters.insert("t0", raster(channels, SIZE + 2, 1e200));
    build_store(&rasters, &records, &out, &params()).unwrap();
    write_records(&tile_info, &records);

    let err = compute_band_stats(&out, &tile_info, &stats_out, &StatsParams::default())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StatisticsOverflow { ref modality, .. } if modality == "sentinel1"
    ));
    assert!(!stats_out.exists());
}

#[test]
fn oversized_tile_ids_are_skipped_at_admission() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (mut records, mut rasters) = dataset(3);
    let long = "x".repeat(101);
    let channels = records[1].1.expected_channels();
    rasters.insert(&long, raster(channels, SIZE + 2, 100.0));
    records[1].0 = long;

    let report = build_store(&rasters, &records, &out, &params()).unwrap();
    assert_eq!(report.bad_ids, 1);
    assert_eq!(report.admitted, 2);
    assert_eq!(report.written, 2);
    let store = DatasetStore::open(&out).unwrap();
    assert_eq!(store.read_metadata(1).unwrap().tile_id, "t2");
}

#[test]
fn missing_weather_values_are_stored_and_masked() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ds.zarr");
    let (mut records, rasters) = dataset(2);
    for (_, r) in records.iter_mut() {
        r.era5 = Some(WeatherStats {
            month1: vec![None, Some(2.0), Some(3.0), Some(4.0)],
            month2: vec![Some(5.0); 4],
            year: vec![Some(9.0); 4],
        });
    }
    let report = build_store(&rasters, &records, &out, &params()).unwrap();
    assert_eq!(report.written, 2);

    let store = DatasetStore::open(&out).unwrap();
    let era5 = store.read_tensor(Modality::Era5, 0).unwrap().to_f64();
    assert!(era5[[0]].is_nan());
    assert_eq!(era5[[1]], 2.0);

    let stats =
        geolr::core::stats::compute_band_stats(&store, &records, &StatsParams::default()).unwrap();
    assert_eq!(stats["era5"].mean[0], None);
    assert_eq!(stats["era5"].mean[1], Some(2.0));
}

#[test]
fn merged_store_concatenates_rows_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let (records, rasters) = dataset(5);
    let (first, second) = records.split_at(2);
    let (first, second) = (first.to_vec(), second.to_vec());

    let inputs: Vec<MergeInput> = [("a", &first), ("b", &second)]
        .into_iter()
        .map(|(name, recs)| {
            let store = dir.path().join(format!("{name}.zarr"));
            let tile_info = dir.path().join(format!("{name}_tile_info.json"));
            build_store(&rasters, recs, &store, &params()).unwrap();
            write_records(&tile_info, recs);
            MergeInput { store, tile_info }
        })
        .collect();

    let out = dir.path().join("ab.zarr");
    let info_out = dir.path().join("ab_tile_info.json");
    let summary = merge_stores(
        &inputs[0],
        &inputs[1],
        &out,
        &info_out,
        &RechunkParams::default(),
    )
    .unwrap();
    assert_eq!(summary.tile_count, 5);

    let merged = DatasetStore::open(&out).unwrap();
    for (row, (id, _)) in records.iter().enumerate() {
        assert_eq!(&merged.read_metadata(row).unwrap().tile_id, id);
    }
    let s2 = merged.read_tensor(Modality::Sentinel2, 3).unwrap().to_f64();
    assert!(s2.iter().all(|v| *v == 100.0));
    assert_eq!(read_tile_records(&info_out).unwrap().len(), 5);
}

#[test]
fn post_download_writes_every_artifact() {
    let root = tempfile::tempdir().unwrap();
    let data_dir = root.path().join("run");
    fs::create_dir_all(data_dir.join("tile_info")).unwrap();
    let (records, rasters) = dataset(6);
    let (first, second) = records.split_at(3);
    write_records(&data_dir.join("tile_info").join("tile_info_0.json"), &first.to_vec());
    write_records(&data_dir.join("tile_info").join("tile_info_1.json"), &second.to_vec());

    let mut params = PipelineParams::default();
    params.build.image_size = SIZE;
    params.splits.train = 0.5;
    params.splits.val = 0.5;

    let paths = DatasetPaths::from_data_dir(&data_dir).unwrap();
    let report = post_download_with_source(&paths, &rasters, &params).unwrap();
    assert_eq!(report.merged_records, Some(6));
    assert_eq!(report.build.written, 6);
    assert_eq!((report.splits.train.len(), report.splits.val.len()), (3, 3));
    assert!(paths.store.is_dir());
    assert!(paths.band_stats.is_file());
    assert!(paths.splits.is_file());
    assert!(report.band_stats.contains_key("era5"));
}
