//! LanceDB persistence for chunk tables.
//!
//! A saved index is a directory holding `chunks.lance/` (one row per chunk)
//! and the `index.json` manifest describing how the vectors were produced.
use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, UInt32Array, UInt64Array};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use localrag_core::config::DistanceMetric;
use localrag_core::types::{Chunk, ChunkMeta};

use crate::schema::{build_chunks_schema, CHUNKS_TABLE};

pub const MANIFEST_FILE: &str = "index.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dim: usize,
    pub metric: DistanceMetric,
    pub chunk_count: usize,
    pub format_version: u32,
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
    Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
}

/// Replace the chunk table under `dir` with `chunks`.
pub async fn write_chunks(dir: &Path, chunks: &[Chunk], dim: usize) -> Result<()> {
    let table_dir = dir.join(format!("{}.lance", CHUNKS_TABLE));
    if table_dir.exists() {
        tokio::fs::remove_dir_all(&table_dir).await?;
    }
    let conn = open_db(dir).await?;
    let schema = build_chunks_schema(dim_i32(dim)?);
    let batches = if chunks.is_empty() { vec![] } else { vec![Ok(chunks_to_record_batch(chunks, dim)?)] };
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
    conn.create_table(CHUNKS_TABLE, reader).execute().await?;
    Ok(())
}

/// Read every chunk back, in the order they were written.
pub async fn read_chunks(dir: &Path, dim: usize) -> Result<Vec<(u64, Chunk)>> {
    let conn = open_db(dir).await?;
    let names = conn.table_names().execute().await?;
    if !names.iter().any(|n| n == CHUNKS_TABLE) {
        return Ok(vec![]);
    }
    let table = conn.open_table(CHUNKS_TABLE).execute().await?;
    let mut stream = table.query().execute().await?;
    let mut out = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        read_batch(&batch, dim, &mut out)?;
    }
    out.sort_by_key(|(seq, _)| *seq);
    Ok(out)
}

fn read_batch(batch: &RecordBatch, dim: usize, out: &mut Vec<(u64, Chunk)>) -> Result<()> {
    let seq = column::<UInt64Array>(batch, "seq")?;
    let ids = column::<StringArray>(batch, "id")?;
    let sources = column::<StringArray>(batch, "source")?;
    let indices = column::<UInt32Array>(batch, "chunk_index")?;
    let offsets = column::<UInt64Array>(batch, "start_offset")?;
    let contents = column::<StringArray>(batch, "content")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;
    for i in 0..batch.num_rows() {
        let embedding: Vec<f32> = vectors
            .value(i)
            .as_primitive::<arrow_array::types::Float32Type>()
            .values()
            .iter()
            .copied()
            .collect();
        if embedding.len() != dim {
            return Err(anyhow!("row {} has {} dims, manifest says {}", ids.value(i), embedding.len(), dim));
        }
        let chunk = Chunk {
            id: ids.value(i).to_string(),
            content: contents.value(i).to_string(),
            embedding,
            metadata: ChunkMeta {
                source: sources.value(i).to_string(),
                chunk_index: indices.value(i) as usize,
                start_offset: offsets.value(i) as usize,
            },
        };
        out.push((seq.value(i), chunk));
    }
    Ok(())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("chunks.{} column missing or mistyped", name))
}

fn chunks_to_record_batch(chunks: &[Chunk], dim: usize) -> Result<RecordBatch> {
    let schema = build_chunks_schema(dim_i32(dim)?);
    let seq: Vec<u64> = (0..chunks.len() as u64).collect();
    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let sources: Vec<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();
    let indices = chunks
        .iter()
        .map(|c| u32::try_from(c.metadata.chunk_index))
        .collect::<std::result::Result<Vec<u32>, _>>()?;
    let offsets: Vec<u64> = chunks.iter().map(|c| c.metadata.start_offset as u64).collect();
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let vectors = chunks.iter().map(|c| Some(c.embedding.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let record_batch = RecordBatch::try_new(schema, vec![
        Arc::new(UInt64Array::from(seq)),
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(indices)),
        Arc::new(UInt64Array::from(offsets)),
        Arc::new(StringArray::from(contents)),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim_i32(dim)?)),
    ])?;
    Ok(record_batch)
}

fn dim_i32(dim: usize) -> Result<i32> { i32::try_from(dim).map_err(|_| anyhow!("dimension {} too large", dim)) }

pub async fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    tokio::fs::write(dir.join(MANIFEST_FILE), json).await?;
    Ok(())
}

pub async fn read_manifest(dir: &Path) -> Result<IndexManifest> {
    let bytes = tokio::fs::read(dir.join(MANIFEST_FILE)).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
