//! Frame audit records.
//!
//! With `REZI_FRAME_AUDIT=1` the builder emits one NDJSON record per built
//! frame on stderr, keyed by frame sequence so downstream pipeline stages
//! (transport, consumer) can correlate their own records with the build
//! stage. stderr is used directly rather than the tracing pipeline so the
//! output stays one-JSON-object-per-line regardless of subscriber
//! formatting.

#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameRecord {
    pub frame: u64,
    pub generation: u64,
    pub total_bytes: u64,
    pub cmd_count: u32,
    pub prelude_frees: usize,
    pub prelude_defs: usize,
    pub body_cmds: u32,
    pub string_count: usize,
    pub string_bytes: usize,
    pub blob_count: usize,
    pub blob_bytes: usize,
}

pub(crate) fn emit_frame_record(record: FrameRecord) {
    let line = serde_json::json!({
        "stage": "build",
        "frame": record.frame,
        "generation": record.generation,
        "total_bytes": record.total_bytes,
        "cmd_count": record.cmd_count,
        "prelude_frees": record.prelude_frees,
        "prelude_defs": record.prelude_defs,
        "body_cmds": record.body_cmds,
        "strings": { "count": record.string_count, "bytes": record.string_bytes },
        "blobs": { "count": record.blob_count, "bytes": record.blob_bytes },
    });
    eprintln!("{line}");
}
