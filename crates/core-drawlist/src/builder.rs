//! The stateful drawlist builder.
//!
//! One builder owns one command buffer, one set of intern tables, and one
//! sticky error slot. Operation calls append fixed-layout records to the
//! body; `build()` assembles header + prelude (frees, then defs) + body;
//! `reset()` commits the frame's resource effects and starts the next one.
//!
//! Error discipline: the builder never panics on bad input and never
//! unwinds through the encode path. The first failure is recorded; every
//! subsequent operation returns without side effects until `reset()`.
//! Operations that produce resource ids return 0 (the wire null id) once the
//! slot is set.
//!
//! Frame lifecycle at `reset()`:
//! * previous frame built — it is considered submitted; definition sets are
//!   committed to the current generation and shipped frees dropped;
//! * previous frame mutated resources but was never built — the consumer
//!   can no longer be assumed in sync, so the engine store is conservatively
//!   marked empty and everything redefines;
//! * otherwise only the per-frame definition sets are cleared.

use crate::audit;
use crate::style::{LinkRefs, Style};
use crate::textrun::{self, ResolvedSegment};
use core_config::{DrawlistConfig, RuntimeToggles};
use core_intern::{BlobNamespace, InternLimits, ResourceTables};
use core_protocol::drawlist::{
    self as wire, HEADER_SIZE, Opcode, RECORD_HEAD, pad4,
};
use core_protocol::{CoreError, CoreResult};
use core_text::{EmojiWidthPolicy, measure_cells};
use smallvec::SmallVec;
use std::time::Instant;

/// The wire null id: returned by resource operations after a failure.
pub const NULL_ID: u32 = 0;

/// Cursor glyph shape; wire values 0..=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

impl CursorShape {
    fn wire(self) -> u8 {
        match self {
            CursorShape::Block => 0,
            CursorShape::Underline => 1,
            CursorShape::Bar => 2,
        }
    }
}

/// Pixel format for canvas and image payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8888,
}

impl PixelFormat {
    fn wire(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 => 0,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
        }
    }
}

/// Caller-facing text run segment: the text plus its cell offset from the
/// run origin.
#[derive(Debug, Clone, Copy)]
pub struct TextRunSegment<'a> {
    pub text: &'a str,
    pub dx: i32,
}

pub struct DrawlistBuilder {
    config: DrawlistConfig,
    toggles: RuntimeToggles,
    policy: EmojiWidthPolicy,
    tables: ResourceTables,
    body: Vec<u8>,
    body_count: u32,
    clip_depth: u32,
    link: LinkRefs,
    error: Option<CoreError>,
    built: bool,
    out: Vec<u8>,
}

impl DrawlistBuilder {
    pub fn new(config: DrawlistConfig) -> Self {
        Self::with_toggles(config, RuntimeToggles::from_env())
    }

    /// Construction with explicit diagnostics toggles (tests pin these).
    pub fn with_toggles(config: DrawlistConfig, toggles: RuntimeToggles) -> Self {
        Self {
            tables: ResourceTables::new(InternLimits {
                max_strings: config.max_strings,
                max_string_bytes: config.max_string_bytes,
                max_blobs: config.max_blobs,
                max_blob_bytes: config.max_blob_bytes,
            }),
            config,
            toggles,
            policy: EmojiWidthPolicy::Wide,
            body: Vec::new(),
            body_count: 0,
            clip_depth: 0,
            link: LinkRefs::default(),
            error: None,
            built: false,
            out: Vec::new(),
        }
    }

    /// Emoji width policy used when measuring text-run segments.
    pub fn set_emoji_policy(&mut self, policy: EmojiWidthPolicy) {
        self.policy = policy;
    }

    pub fn error(&self) -> Option<&CoreError> {
        self.error.as_ref()
    }

    pub fn frame_seq(&self) -> u64 {
        self.tables.frame_seq()
    }

    pub fn engine_generation(&self) -> u64 {
        self.tables.engine_generation()
    }

    /// Body command count so far (prelude records are added at build time).
    pub fn cmd_count(&self) -> u32 {
        self.body_count
    }

    /// Read access to the intern tables, for diagnostics and tests.
    pub fn resources(&self) -> &ResourceTables {
        &self.tables
    }

    /// The consumer-side resource store was cleared (engine restart): bump
    /// the generation so every referenced resource redefines.
    pub fn mark_engine_store_empty(&mut self) {
        self.tables.mark_engine_store_empty();
    }

    // ---------------------------------------------------------------------
    // Error slot + record plumbing
    // ---------------------------------------------------------------------

    fn fail(&mut self, error: CoreError) {
        if self.error.is_none() {
            tracing::debug!(
                target: "drawlist.builder",
                code = error.kind.code(),
                detail = %error.detail,
                "builder entered failed state"
            );
            self.error = Some(error);
        }
    }

    /// Gate for every operation: sticky error and post-build calls no-op.
    fn op_ready(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.built {
            self.fail(CoreError::bad_params(
                "operation after build(); reset() starts the next frame",
            ));
            return false;
        }
        true
    }

    fn take_cmd_budget(&mut self, records: u32) -> bool {
        if (self.body_count + records) as usize > self.config.max_cmd_count {
            self.fail(CoreError::too_large(format!(
                "command count would exceed max_cmd_count {}",
                self.config.max_cmd_count
            )));
            return false;
        }
        true
    }

    fn begin_record(&mut self, op: Opcode, payload_len: u32) {
        let size = RECORD_HEAD + pad4(payload_len);
        self.body.extend_from_slice(&(op as u16).to_le_bytes());
        self.body.extend_from_slice(&0u16.to_le_bytes());
        self.body.extend_from_slice(&size.to_le_bytes());
        self.body_count += 1;
    }

    fn put_i32(&mut self, v: i32) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }

    fn put_style(&mut self, style: &Style) {
        style.to_wire(self.link).write_to(&mut self.body);
    }

    fn validate_extent(&mut self, what: &'static str, v: i32) -> bool {
        if self.config.validate_params && v < 0 {
            self.fail(CoreError::bad_params(format!("{what} must be >= 0, got {v}")));
            return false;
        }
        true
    }

    fn validate_pixel_dims(&mut self, px_w: u32, px_h: u32) -> bool {
        if !self.config.validate_params {
            return true;
        }
        for (name, v) in [("px_w", px_w), ("px_h", px_h)] {
            if v == 0 || v > 65_535 {
                self.fail(CoreError::bad_params(format!(
                    "{name} must be in 1..=65535, got {v}"
                )));
                return false;
            }
        }
        true
    }

    // ---------------------------------------------------------------------
    // Resource operations
    // ---------------------------------------------------------------------

    /// Intern a string, returning its id (0 after a failure).
    pub fn intern_string(&mut self, text: &str) -> u32 {
        if !self.op_ready() {
            return NULL_ID;
        }
        match self.tables.intern_string(text) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                NULL_ID
            }
        }
    }

    /// Intern an opaque blob under an optional caller key (0 after a
    /// failure). `string_deps` are ids the blob content references.
    pub fn add_blob(&mut self, bytes: &[u8], key: Option<&str>, string_deps: &[u32]) -> u32 {
        if !self.op_ready() {
            return NULL_ID;
        }
        let key = key.map(|k| (k, BlobNamespace::User));
        match self.tables.add_blob(bytes, key, string_deps) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                NULL_ID
            }
        }
    }

    // ---------------------------------------------------------------------
    // Draw operations
    // ---------------------------------------------------------------------

    pub fn clear(&mut self) {
        if !self.op_ready() || !self.take_cmd_budget(1) {
            return;
        }
        self.begin_record(Opcode::Clear, wire::PAYLOAD_CLEAR);
    }

    /// Fill a cell rect. A style that overrides nothing (and no active link)
    /// emits no record.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, style: &Style) {
        if !self.op_ready() {
            return;
        }
        if !self.validate_extent("fill_rect width", w) || !self.validate_extent("fill_rect height", h)
        {
            return;
        }
        if style.to_wire(self.link).is_empty() {
            return;
        }
        if !self.take_cmd_budget(1) {
            return;
        }
        self.begin_record(Opcode::FillRect, wire::PAYLOAD_FILL_RECT);
        self.put_i32(x);
        self.put_i32(y);
        self.put_i32(w);
        self.put_i32(h);
        self.put_style(style);
    }

    /// Draw a whole string at a cell position.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, style: &Style) {
        if !self.op_ready() || !self.take_cmd_budget(1) {
            return;
        }
        let byte_len = match u32::try_from(text.len()) {
            Ok(n) => n,
            Err(_) => {
                self.fail(CoreError::bad_params("text exceeds u32 byte length"));
                return;
            }
        };
        let id = match self.tables.intern_string(text) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        self.emit_draw_text(x, y, id, 0, byte_len, style);
    }

    /// Draw a byte range of an already interned string.
    pub fn draw_text_range(
        &mut self,
        x: i32,
        y: i32,
        string_id: u32,
        byte_off: u32,
        byte_len: u32,
        style: &Style,
    ) {
        if !self.op_ready() || !self.take_cmd_budget(1) {
            return;
        }
        let total = match self.tables.strings.get(string_id) {
            Some(entry) => entry.bytes.len() as u64,
            None => {
                self.fail(CoreError::bad_params(format!(
                    "unknown string id {string_id}"
                )));
                return;
            }
        };
        if self.config.validate_params && byte_off as u64 + byte_len as u64 > total {
            self.fail(CoreError::bad_params(format!(
                "byte range {byte_off}+{byte_len} exceeds string length {total}"
            )));
            return;
        }
        if let Err(e) = self.tables.touch_string(string_id) {
            self.fail(e);
            return;
        }
        self.emit_draw_text(x, y, string_id, byte_off, byte_len, style);
    }

    fn emit_draw_text(
        &mut self,
        x: i32,
        y: i32,
        string_id: u32,
        byte_off: u32,
        byte_len: u32,
        style: &Style,
    ) {
        if !self.take_cmd_budget(1) {
            return;
        }
        self.begin_record(Opcode::DrawText, wire::PAYLOAD_DRAW_TEXT);
        self.put_i32(x);
        self.put_i32(y);
        self.put_u32(string_id);
        self.put_u32(byte_off);
        self.put_u32(byte_len);
        self.put_style(style);
        self.put_u32(0); // reserved
    }

    pub fn push_clip(&mut self, x: i32, y: i32, w: i32, h: i32) {
        if !self.op_ready() {
            return;
        }
        if !self.validate_extent("clip width", w) || !self.validate_extent("clip height", h) {
            return;
        }
        if !self.take_cmd_budget(1) {
            return;
        }
        self.clip_depth += 1;
        self.begin_record(Opcode::PushClip, wire::PAYLOAD_PUSH_CLIP);
        self.put_i32(x);
        self.put_i32(y);
        self.put_i32(w);
        self.put_i32(h);
    }

    pub fn pop_clip(&mut self) {
        if !self.op_ready() {
            return;
        }
        if self.config.validate_params && self.clip_depth == 0 {
            self.fail(CoreError::bad_params("pop_clip without a matching push_clip"));
            return;
        }
        if !self.take_cmd_budget(1) {
            return;
        }
        self.clip_depth = self.clip_depth.saturating_sub(1);
        self.begin_record(Opcode::PopClip, wire::PAYLOAD_POP_CLIP);
    }

    /// Shape, measure, and intern a text run, then draw it. Returns the run
    /// blob id (0 after a failure) so callers can redraw it cheaply via
    /// [`DrawlistBuilder::draw_text_run_blob`].
    pub fn draw_text_run(
        &mut self,
        x: i32,
        y: i32,
        key: Option<&str>,
        segments: &[TextRunSegment<'_>],
    ) -> u32 {
        if !self.op_ready() || !self.take_cmd_budget(1) {
            return NULL_ID;
        }
        let mut resolved: Vec<ResolvedSegment> = Vec::with_capacity(segments.len());
        let mut deps: SmallVec<[u32; 8]> = SmallVec::new();
        for seg in segments {
            let byte_len = match u32::try_from(seg.text.len()) {
                Ok(n) => n,
                Err(_) => {
                    self.fail(CoreError::bad_params("segment exceeds u32 byte length"));
                    return NULL_ID;
                }
            };
            let id = match self.tables.intern_string(seg.text) {
                Ok(id) => id,
                Err(e) => {
                    self.fail(e);
                    return NULL_ID;
                }
            };
            if !deps.contains(&id) {
                deps.push(id);
            }
            resolved.push(ResolvedSegment {
                string_id: id,
                byte_off: 0,
                byte_len,
                dx: seg.dx,
                width: measure_cells(seg.text, self.policy) as u32,
            });
        }
        let payload = textrun::encode_payload(&resolved);
        let key = key.map(|k| (k, BlobNamespace::TextRun));
        let blob_id = match self.tables.add_blob(&payload, key, &deps) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                return NULL_ID;
            }
        };
        self.emit_text_run(x, y, blob_id);
        blob_id
    }

    /// Draw a previously created text-run blob.
    pub fn draw_text_run_blob(&mut self, x: i32, y: i32, blob_id: u32) {
        if !self.op_ready() {
            return;
        }
        if let Err(e) = self.tables.touch_blob(blob_id) {
            self.fail(e);
            return;
        }
        self.emit_text_run(x, y, blob_id);
    }

    fn emit_text_run(&mut self, x: i32, y: i32, blob_id: u32) {
        if !self.take_cmd_budget(1) {
            return;
        }
        self.begin_record(Opcode::DrawTextRun, wire::PAYLOAD_DRAW_TEXT_RUN);
        self.put_i32(x);
        self.put_i32(y);
        self.put_u32(blob_id);
        self.put_u32(0); // reserved
    }

    pub fn set_cursor(&mut self, x: i32, y: i32, shape: CursorShape, visible: bool, blink: bool) {
        if !self.op_ready() || !self.take_cmd_budget(1) {
            return;
        }
        self.begin_record(Opcode::SetCursor, wire::PAYLOAD_SET_CURSOR);
        self.put_i32(x);
        self.put_i32(y);
        self.body.extend_from_slice(&[shape.wire(), visible as u8, blink as u8, 0]);
    }

    /// Draw an RGBA canvas blob into a cell rect. Returns the blob id
    /// (0 after a failure).
    #[allow(clippy::too_many_arguments)]
    pub fn draw_canvas(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        px_w: u32,
        px_h: u32,
        rgba: &[u8],
        key: Option<&str>,
    ) -> u32 {
        if !self.op_ready() {
            return NULL_ID;
        }
        if !self.validate_extent("canvas width", w)
            || !self.validate_extent("canvas height", h)
            || !self.validate_pixel_dims(px_w, px_h)
            || !self.validate_pixel_payload(px_w, px_h, PixelFormat::Rgba8888, rgba)
        {
            return NULL_ID;
        }
        let blob_id = self.add_pixel_blob(rgba, key);
        if blob_id == NULL_ID {
            return NULL_ID;
        }
        if !self.take_cmd_budget(1) {
            return NULL_ID;
        }
        self.begin_record(Opcode::DrawCanvas, wire::PAYLOAD_DRAW_CANVAS);
        self.put_i32(x);
        self.put_i32(y);
        self.put_i32(w);
        self.put_i32(h);
        self.put_u32(blob_id);
        self.put_u32(px_w);
        self.put_u32(px_h);
        self.put_u32(PixelFormat::Rgba8888.wire());
        blob_id
    }

    /// Draw an image blob with a z-layer: -1 under the cells, 0 inline,
    /// 1 above. Returns the blob id (0 after a failure).
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        px_w: u32,
        px_h: u32,
        z: i32,
        rgba: &[u8],
        key: Option<&str>,
    ) -> u32 {
        if !self.op_ready() {
            return NULL_ID;
        }
        if self.config.validate_params && !(-1..=1).contains(&z) {
            self.fail(CoreError::bad_params(format!(
                "image z layer must be -1, 0, or 1, got {z}"
            )));
            return NULL_ID;
        }
        if !self.validate_extent("image width", w)
            || !self.validate_extent("image height", h)
            || !self.validate_pixel_dims(px_w, px_h)
            || !self.validate_pixel_payload(px_w, px_h, PixelFormat::Rgba8888, rgba)
        {
            return NULL_ID;
        }
        let blob_id = self.add_pixel_blob(rgba, key);
        if blob_id == NULL_ID {
            return NULL_ID;
        }
        if !self.take_cmd_budget(1) {
            return NULL_ID;
        }
        self.begin_record(Opcode::DrawImage, wire::PAYLOAD_DRAW_IMAGE);
        self.put_i32(x);
        self.put_i32(y);
        self.put_i32(w);
        self.put_i32(h);
        self.put_u32(blob_id);
        self.put_u32(px_w);
        self.put_u32(px_h);
        self.put_i32(z);
        self.put_u32(PixelFormat::Rgba8888.wire());
        self.put_u32(0); // reserved
        blob_id
    }

    fn validate_pixel_payload(
        &mut self,
        px_w: u32,
        px_h: u32,
        format: PixelFormat,
        bytes: &[u8],
    ) -> bool {
        if !self.config.validate_params {
            return true;
        }
        let expected = px_w as u64 * px_h as u64 * format.bytes_per_pixel() as u64;
        if bytes.len() as u64 != expected {
            self.fail(CoreError::bad_params(format!(
                "pixel payload is {} bytes, {px_w}x{px_h} RGBA needs {expected}",
                bytes.len()
            )));
            return false;
        }
        true
    }

    fn add_pixel_blob(&mut self, bytes: &[u8], key: Option<&str>) -> u32 {
        let key = key.map(|k| (k, BlobNamespace::User));
        match self.tables.add_blob(bytes, key, &[]) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                NULL_ID
            }
        }
    }

    // ---------------------------------------------------------------------
    // Link context
    // ---------------------------------------------------------------------

    /// Activate a hyperlink context: subsequent styled records carry the
    /// interned URI (and optional id) refs until `clear_link()`.
    pub fn set_link(&mut self, uri: &str, id: Option<&str>) {
        if !self.op_ready() {
            return;
        }
        let uri_ref = match self.tables.intern_string(uri) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        let id_ref = match id {
            None => 0,
            Some(text) => match self.tables.intern_string(text) {
                Ok(id) => id,
                Err(e) => {
                    self.fail(e);
                    return;
                }
            },
        };
        self.link = LinkRefs {
            uri: uri_ref,
            id: id_ref,
        };
    }

    pub fn clear_link(&mut self) {
        if !self.op_ready() {
            return;
        }
        self.link = LinkRefs::default();
    }

    // ---------------------------------------------------------------------
    // Frame lifecycle
    // ---------------------------------------------------------------------

    /// Assemble the frame: header, prelude (frees then defs), body. Fails
    /// without assembling when the error slot is set or a size limit is
    /// exceeded; the error also lands in the slot so the caller's next
    /// `reset()` takes the conservative path.
    pub fn build(&mut self) -> CoreResult<&[u8]> {
        let started = self.toggles.perf_timing.then(Instant::now);
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if self.built {
            return Err(CoreError::internal("frame already built; reset() first"));
        }
        if self.body.len() % 4 != 0 {
            let e = CoreError::internal("command buffer is not 4-byte aligned");
            self.fail(e.clone());
            return Err(e);
        }

        // Prelude geometry. Every def id is pinned this frame, so the
        // entries must be live; a miss is a violated invariant.
        let free_strings = self.tables.pending_free_strings().to_vec();
        let free_blobs = self.tables.pending_free_blobs().to_vec();
        let def_strings = self.tables.frame_def_strings().to_vec();
        let def_blobs = self.tables.frame_def_blobs().to_vec();
        let free_record = RECORD_HEAD + pad4(wire::PAYLOAD_FREE);
        let mut prelude_bytes: u64 =
            (free_strings.len() + free_blobs.len()) as u64 * free_record as u64;
        for &id in &def_strings {
            let Some(entry) = self.tables.strings.get(id) else {
                let e = CoreError::internal(format!("definition set references dead string {id}"));
                self.fail(e.clone());
                return Err(e);
            };
            prelude_bytes += (RECORD_HEAD + pad4(8 + entry.bytes.len() as u32)) as u64;
        }
        for &id in &def_blobs {
            let Some(entry) = self.tables.blobs.get(id) else {
                let e = CoreError::internal(format!("definition set references dead blob {id}"));
                self.fail(e.clone());
                return Err(e);
            };
            prelude_bytes += (RECORD_HEAD + pad4(8 + entry.bytes.len() as u32)) as u64;
        }
        let prelude_count =
            (free_strings.len() + free_blobs.len() + def_strings.len() + def_blobs.len()) as u32;
        let cmd_count = prelude_count + self.body_count;
        if cmd_count as usize > self.config.max_cmd_count {
            let e = CoreError::too_large(format!(
                "{cmd_count} commands exceed max_cmd_count {}",
                self.config.max_cmd_count
            ));
            self.fail(e.clone());
            return Err(e);
        }
        let total_size = HEADER_SIZE as u64 + prelude_bytes + self.body.len() as u64;
        if total_size > self.config.max_drawlist_bytes as u64 {
            let e = CoreError::too_large(format!(
                "frame of {total_size} bytes exceeds max_drawlist_bytes {}",
                self.config.max_drawlist_bytes
            ));
            self.fail(e.clone());
            return Err(e);
        }

        self.out.clear();
        self.out.reserve(total_size as usize);
        let cmd_bytes = (total_size - HEADER_SIZE as u64) as u32;
        let cmd_offset = if cmd_count == 0 { 0 } else { HEADER_SIZE };
        for word in [
            wire::DRAWLIST_MAGIC,
            wire::DRAWLIST_VERSION,
            HEADER_SIZE,
            total_size as u32,
            cmd_offset,
            cmd_bytes,
            cmd_count,
        ] {
            self.out.extend_from_slice(&word.to_le_bytes());
        }
        self.out.resize(HEADER_SIZE as usize, 0);

        // Prelude: frees before defs, each in insertion order; string defs
        // before blob defs so blob deps are always defined first.
        for (op, ids) in [
            (Opcode::FreeString, &free_strings),
            (Opcode::FreeBlob, &free_blobs),
        ] {
            for &id in ids {
                self.out.extend_from_slice(&(op as u16).to_le_bytes());
                self.out.extend_from_slice(&0u16.to_le_bytes());
                self.out.extend_from_slice(&free_record.to_le_bytes());
                self.out.extend_from_slice(&id.to_le_bytes());
            }
        }
        for &id in &def_strings {
            let entry = self.tables.strings.get(id).expect("checked above");
            write_def(&mut self.out, Opcode::DefString, id, &entry.bytes);
        }
        for &id in &def_blobs {
            let entry = self.tables.blobs.get(id).expect("checked above");
            write_def(&mut self.out, Opcode::DefBlob, id, &entry.bytes);
        }
        self.out.extend_from_slice(&self.body);
        debug_assert_eq!(self.out.len() as u64, total_size);

        self.built = true;
        if self.toggles.frame_audit {
            audit::emit_frame_record(audit::FrameRecord {
                frame: self.tables.frame_seq(),
                generation: self.tables.engine_generation(),
                total_bytes: total_size,
                cmd_count,
                prelude_frees: self.tables.pending_free_strings().len()
                    + self.tables.pending_free_blobs().len(),
                prelude_defs: self.tables.frame_def_strings().len()
                    + self.tables.frame_def_blobs().len(),
                body_cmds: self.body_count,
                string_count: self.tables.strings.len(),
                string_bytes: self.tables.strings.bytes_total(),
                blob_count: self.tables.blobs.len(),
                blob_bytes: self.tables.blobs.bytes_total(),
            });
        }
        if let Some(started) = started {
            tracing::debug!(
                target: "drawlist.perf",
                phase = "build",
                micros = started.elapsed().as_micros() as u64,
                bytes = total_size,
                "frame built"
            );
        }
        Ok(&self.out)
    }

    /// Commit the previous frame's effects and start the next frame.
    pub fn reset(&mut self) {
        let started = self.toggles.perf_timing.then(Instant::now);
        if self.built {
            self.tables.commit_submitted_frame();
        } else if self.tables.frame_mutated() {
            // The frame touched resources but was never built, so the
            // consumer's view is unknowable; force full redefinition.
            self.tables.mark_engine_store_empty();
        }
        self.tables.begin_frame();
        self.body.clear();
        self.body_count = 0;
        self.clip_depth = 0;
        self.link = LinkRefs::default();
        self.error = None;
        self.built = false;
        if self.config.reuse_output_buffer {
            self.out.clear();
        } else {
            self.out = Vec::new();
        }
        if let Some(started) = started {
            tracing::debug!(
                target: "drawlist.perf",
                phase = "reset",
                micros = started.elapsed().as_micros() as u64,
                frame = self.tables.frame_seq(),
                "frame reset"
            );
        }
    }
}

fn write_def(out: &mut Vec<u8>, op: Opcode, id: u32, bytes: &[u8]) {
    let payload = 8 + bytes.len() as u32;
    let size = RECORD_HEAD + pad4(payload);
    out.extend_from_slice(&(op as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
    let pad = (pad4(payload) - payload) as usize;
    out.extend_from_slice(&[0u8; 3][..pad]);
}
