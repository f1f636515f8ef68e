use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use hierarchy_core::domain::{Notification, Topic};
use hierarchy_core::impls::InMemoryStore;
use hierarchy_core::notify::Subscriber;
use hierarchy_core::{HierarchyConfig, JobNode, StatusCategory, Tracker, TrackerBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// job.status_update を JSON で標準出力に流す subscriber
struct JsonPrinter;

#[async_trait]
impl Subscriber for JsonPrinter {
    fn name(&self) -> &str {
        "json_printer"
    }

    async fn notify(&self, notification: &Notification) -> hierarchy_core::Result<()> {
        match serde_json::to_string(notification) {
            Ok(line) => println!("{line}"),
            Err(e) => println!("unprintable notification: {e}"),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CollectionSummary {
    category: StatusCategory,
    size: u64,
    workflows: Vec<String>,
}

/// 親 1 + 子 n の木を投入
async fn submit_batch(
    tracker: &Tracker,
    name: &str,
    children: usize,
) -> hierarchy_core::Result<Vec<JobNode>> {
    let root = tracker
        .submit(BTreeMap::from([("name".to_string(), name.to_string())]))
        .await?;
    let mut nodes = vec![root.clone()];
    for i in 0..children {
        let child = tracker
            .submit(BTreeMap::from([("name".to_string(), format!("{name}.{i}"))]))
            .await?;
        root.add_child(&child).await?;
        nodes.push(child);
    }
    Ok(nodes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // (A) 設定（引数に JSON ファイルがあれば読む）
    let config = match std::env::args().nth(1) {
        Some(path) => HierarchyConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => HierarchyConfig::default(),
    };

    // (B) Tracker を組み立てる（store は in-memory、collection sync 有効）
    let tracker = TrackerBuilder::new()
        .store(Arc::new(InMemoryStore::new()))
        .config(config)
        .subscribe(Topic::JobStatusUpdate, Arc::new(JsonPrinter))
        .with_collection_sync()
        .build()?;

    // (C) 成功する木: 全ジョブが run → complete
    let import = submit_batch(&tracker, "import", 3).await?;
    for node in &import {
        node.run().await?;
    }
    for node in import.iter().rev() {
        node.complete().await?;
    }

    // (D) 失敗する木: 1 件が requeue を経て失敗
    let export = submit_batch(&tracker, "export", 2).await?;
    let flaky = &export[1];
    export[0].run().await?;
    flaky.run().await?;
    flaky.requeue().await?;
    flaky.run().await?;
    let transition = flaky.fail().await?;
    if let Some(change) = &transition.workflow {
        info!(workflow = %change.workflow, status = %change.status, "workflow settled");
    }

    // (E) 途中の木: まだ走っている
    let report = submit_batch(&tracker, "report", 1).await?;
    report[0].run().await?;

    // (F) コレクションの中身を出力
    let mut summary = Vec::new();
    for category in StatusCategory::ALL {
        let collection = tracker.collection(category);
        let mut workflows = Vec::new();
        let mut cursor = tracker.workflows(category);
        while let Some(workflow) = cursor.next().await? {
            let status = workflow.status().await?;
            workflows.push(format!("{} ({status})", workflow.jid()));
        }
        summary.push(CollectionSummary {
            category,
            size: collection.size().await?,
            workflows,
        });
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
