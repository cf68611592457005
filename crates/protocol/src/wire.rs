//! Wire-Format der Transport-Pakete
//!
//! Jedes ausgehende Paket auf dem Transport ist exakt:
//!
//! ```text
//! +--------+----...----+
//! | Tag    | Payload   |
//! +--------+----...----+
//! ```
//!
//! Byte 0 ist das Codec-Tag (0x01 = Opus, 0x02 = Codec2), dahinter folgt
//! die rohe Codec-Payload. Bei Codec2 ist das erste Payload-Byte der
//! Mode-Header des Codecs selbst (dessen eigenes Framing), gefolgt von
//! einem oder mehreren Subframes. Bei Opus ist die Payload genau ein
//! Opus-Paket aus einem einzelnen Encode-Aufruf.
//!
//! Das Tag ist informativ: die Decode-Parameter kommen aus dem
//! ausgehandelten Profil, weil sich beide Seiten bereits geeinigt haben.

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Codec-Tag fuer Opus-Payloads
pub const CODEC_TAG_OPUS: u8 = 0x01;

/// Codec-Tag fuer Codec2-Payloads
pub const CODEC_TAG_CODEC2: u8 = 0x02;

/// Groesse des Tag-Felds in Bytes
pub const TAG_FIELD_SIZE: usize = 1;

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Stellt einer Codec-Payload das Tag-Byte voran.
///
/// Schreibt in den uebergebenen Puffer, damit der Sender seine Allokation
/// ueber viele Pakete wiederverwenden kann.
pub fn tag_packet(tag: u8, payload: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(TAG_FIELD_SIZE + payload.len());
    out.push(tag);
    out.extend_from_slice(payload);
}

/// Zerlegt ein eingehendes Paket in Tag-Byte und Codec-Payload.
///
/// Gibt `None` fuer das leere Paket zurueck; eine leere Payload hinter
/// einem Tag ist dagegen gueltig und Sache des Codecs.
pub fn split_tagged(packet: &[u8]) -> Option<(u8, &[u8])> {
    let (tag, payload) = packet.split_first()?;
    Some((*tag, payload))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
