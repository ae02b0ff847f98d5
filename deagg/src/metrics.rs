//! Deaggregation engine metrics.
//!
//! Counters for frame deaggregation, checksum offload outcomes, coalescing
//! segmentation, and descriptor pool pressure. Automatically exposed via
//! Prometheus when registered with an admin server.

use metriken::{Counter, Gauge, metric};

// ── Descriptor pool ──────────────────────────────────────────────

#[metric(
    name = "deagg/pool/allocated",
    description = "Total descriptors allocated beyond the free list"
)]
pub static POOL_ALLOCATED: Counter = Counter::new();

#[metric(
    name = "deagg/pool/recycled",
    description = "Total descriptors returned to the free list"
)]
pub static POOL_RECYCLED: Counter = Counter::new();

#[metric(
    name = "deagg/pool/exhausted",
    description = "Descriptor requests refused at the pool cap"
)]
pub static POOL_EXHAUSTED: Counter = Counter::new();

#[metric(
    name = "deagg/pool/size",
    description = "Descriptors currently in existence (free or in flight)"
)]
pub static POOL_SIZE: Gauge = Gauge::new();

// ── Deaggregation ────────────────────────────────────────────────

#[metric(
    name = "deagg/frames",
    description = "QMAP frames carved out of downlink buffers"
)]
pub static DEAGG_FRAMES: Counter = Counter::new();

#[metric(
    name = "deagg/bytes",
    description = "Bytes consumed from downlink buffers, headers included"
)]
pub static DEAGG_BYTES: Counter = Counter::new();

#[metric(
    name = "deagg/truncated",
    description = "Downlink buffers abandoned on a short or truncated frame"
)]
pub static DEAGG_TRUNCATED: Counter = Counter::new();

#[metric(
    name = "deagg/chains",
    description = "Downlink buffer chains handled"
)]
pub static DEAGG_CHAINS: Counter = Counter::new();

#[metric(
    name = "deagg/buffers",
    description = "Downlink buffers handled"
)]
pub static DEAGG_BUFFERS: Counter = Counter::new();

#[metric(
    name = "deagg/buffer_frags",
    description = "Backing fragments observed across downlink buffers"
)]
pub static DEAGG_BUFFER_FRAGS: Counter = Counter::new();

#[metric(
    name = "deagg/mux_miss",
    description = "Data frames dropped for an unconfigured mux ID"
)]
pub static MUX_MISS: Counter = Counter::new();

#[metric(
    name = "deagg/commands",
    description = "Control command frames handed to the dispatcher"
)]
pub static COMMAND_FRAMES: Counter = Counter::new();

// ── Checksum offload ─────────────────────────────────────────────

#[metric(
    name = "deagg/csum/ok",
    description = "Packets whose checksum was accepted, by hardware or software"
)]
pub static CSUM_OK: Counter = Counter::new();

#[metric(
    name = "deagg/csum/bad",
    description = "Packets whose transport checksum failed validation"
)]
pub static CSUM_BAD: Counter = Counter::new();

#[metric(
    name = "deagg/csum/skipped",
    description = "Packets passed through with checksum offload disabled on the device"
)]
pub static CSUM_SKIPPED: Counter = Counter::new();

#[metric(
    name = "deagg/csum/unsupported",
    description = "Packets software validation could not checksum (fragments, unknown protocols)"
)]
pub static CSUM_UNSUPPORTED: Counter = Counter::new();

// ── Coalescing ───────────────────────────────────────────────────

#[metric(
    name = "deagg/coal/superframes",
    description = "Coalesced superframes received"
)]
pub static COAL_SUPERFRAMES: Counter = Counter::new();

#[metric(
    name = "deagg/coal/packets",
    description = "Packets described by coalescing headers"
)]
pub static COAL_PACKETS: Counter = Counter::new();

#[metric(
    name = "deagg/coal/passthrough",
    description = "Superframes delivered whole on the aggregate fast path"
)]
pub static COAL_PASSTHROUGH: Counter = Counter::new();

#[metric(
    name = "deagg/coal/segments",
    description = "Segments reconstructed from superframes"
)]
pub static COAL_SEGMENTS: Counter = Counter::new();

#[metric(
    name = "deagg/coal/csum_errors",
    description = "Coalesced packets flagged bad by the hardware error bitmap"
)]
pub static COAL_CSUM_ERRORS: Counter = Counter::new();

#[metric(
    name = "deagg/coal/header_errors",
    description = "Superframes dropped for an invalid coalescing header"
)]
pub static COAL_HEADER_ERRORS: Counter = Counter::new();

#[metric(
    name = "deagg/coal/ip_invalid",
    description = "Superframes dropped for an unparsable IP header"
)]
pub static COAL_IP_INVALID: Counter = Counter::new();

#[metric(
    name = "deagg/coal/trans_invalid",
    description = "Superframes dropped for an unsupported transport header"
)]
pub static COAL_TRANS_INVALID: Counter = Counter::new();

// ── Delivery ─────────────────────────────────────────────────────

#[metric(
    name = "deagg/delivered/packets",
    description = "Packets materialized and handed to the dispatcher"
)]
pub static DELIVERED_PACKETS: Counter = Counter::new();

#[metric(
    name = "deagg/delivered/bytes",
    description = "Payload bytes materialized and handed to the dispatcher"
)]
pub static DELIVERED_BYTES: Counter = Counter::new();
