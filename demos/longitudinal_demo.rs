//! 纵向定位演示程序
//!
//! 全部使用进程内存储：两次随访各上传一批DICOM文件，导入后建立切片索引，
//! 再在两次检查中定位同一个解剖点。

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vizor::core::{CreatorRole, Study, UploadSession};
use vizor::database::{DatabaseQueries, MemoryStore};
use vizor::dicom::fixtures::dicom_file;
use vizor::dicom::{tags, DicomJsonDataset};
use vizor::integration::InMemoryDicomStore;
use vizor::longitudinal::LongitudinalIndexer;
use vizor::storage::ObjectStoreSource;
use vizor::workflow::IngestOrchestrator;

const BUCKET: &str = "vv-storage-vault";
const PATIENT: &str = "patient-42";
const FRAME: &str = "1.2.826.0.1.3680043.2.1125.1";
const SLICES: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let queries = DatabaseQueries::new(Arc::new(MemoryStore::new()));
    let objects = Arc::new(InMemory::new());
    let dicom = Arc::new(InMemoryDicomStore::new(
        "projects/demo/locations/local/datasets/demo/dicomStores/demo",
    ));
    let source = ObjectStoreSource::new().with_bucket(BUCKET, objects.clone());
    let ingest = IngestOrchestrator::new(
        queries.clone(),
        dicom.clone(),
        Arc::new(source),
        Duration::from_millis(20),
    );
    let indexer = LongitudinalIndexer::new(queries.clone(), dicom.clone());

    println!("🚀 纵向定位演示\n");

    // 1. 两次随访，第二次整体沿 z 轴偏移 2.5mm
    let mut studies: Vec<Study> = Vec::new();
    for (visit, z_shift) in [(1, 0.0), (2, 2.5)] {
        let session_id = format!("SESS-{}", visit);
        queries
            .create_upload_session(&UploadSession::new(&session_id, PATIENT, CreatorRole::Patient))
            .await?;

        let study_uid = format!("1.2.826.0.1.{}", visit);
        let series_uid = format!("{}.1", study_uid);
        for i in 0..SLICES {
            let sop_uid = format!("{}.{}", series_uid, i);
            let name = format!("{}/{}/IMG{:04}.dcm", PATIENT, session_id, i);
            objects
                .put(&Path::from(name), Bytes::from(dicom_file(&study_uid, &series_uid, &sop_uid, "CT")))
                .await?;
        }
        dicom
            .put_study(&study_uid, axial_series(&series_uid, z_shift))
            .await;

        let location = format!("gs://{}/{}/{}/", BUCKET, PATIENT, session_id);
        let created = ingest
            .trigger_ingest(&session_id, &location, &CancellationToken::new())
            .await?;
        println!("✅ 会话 {} 导入完成，新建 {} 个检查", session_id, created.len());
        studies.extend(created);
    }

    // 2. 建立切片索引
    let study_ids: Vec<String> = studies.iter().map(|s| s.study_id.clone()).collect();
    for study_id in &study_ids {
        let count = indexer.trigger_indexing(PATIENT, study_id).await?;
        println!("📐 检查 {} 已索引 {} 张切片", study_id, count);
    }

    let statuses = indexer.index_statuses(PATIENT, &study_ids).await?;
    println!("\n📊 索引状态:");
    for study_id in &study_ids {
        if let Some(status) = statuses.get(study_id) {
            println!("   {}: {:?}", study_id, status.status);
        }
    }

    // 3. 定位同一个点
    let point = [12.0, -30.0, 21.0];
    let matches = indexer.resolve_point(PATIENT, FRAME, point, &study_ids).await?;
    println!("\n🎯 点 {:?} 的定位结果:", point);
    for m in &matches {
        println!(
            "   {} -> 实例 #{} ({}), row {:.1}, col {:.1}, 距离 {:.2}mm",
            m.study_id, m.instance_number, m.sop_instance_uid, m.row, m.col, m.distance
        );
    }

    Ok(())
}

/// 5mm 层厚的轴位序列
fn axial_series(series_uid: &str, z_shift: f64) -> Vec<DicomJsonDataset> {
    (0..SLICES)
        .map(|i| {
            let z = i as f64 * 5.0 + z_shift;
            DicomJsonDataset::new()
                .with(tags::SERIES_INSTANCE_UID, "UI", vec![json!(series_uid)])
                .with(tags::SOP_INSTANCE_UID, "UI", vec![json!(format!("{}.{}", series_uid, i))])
                .with(tags::INSTANCE_NUMBER, "IS", vec![json!(i + 1)])
                .with(tags::FRAME_OF_REFERENCE_UID, "UI", vec![json!(FRAME)])
                .with(tags::IMAGE_POSITION_PATIENT, "DS", vec![json!(-100.0), json!(-100.0), json!(z)])
                .with(
                    tags::IMAGE_ORIENTATION_PATIENT,
                    "DS",
                    vec![json!(1), json!(0), json!(0), json!(0), json!(1), json!(0)],
                )
                .with(tags::PIXEL_SPACING, "DS", vec![json!(0.78125), json!(0.78125)])
        })
        .collect()
}
