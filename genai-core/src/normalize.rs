use crate::content::{Content, GenerateContentRequest, GenerationConfig, Part};
use unicode_normalization::UnicodeNormalization;

fn clean_text(s: &str) -> String {
    // Unicode NFC normalization + BOM strip + CRLF -> LF + trim
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

fn clamp_round_f32(x: f32, lo: f32, hi: f32, dp: u32) -> f32 {
    let clamped = x.clamp(lo, hi);
    let p = 10f32.powi(dp as i32);
    (clamped * p).round() / p
}

fn clean_content(content: &mut Content) {
    for part in &mut content.parts {
        if let Part::Text(t) = part {
            *t = clean_text(t);
        }
    }
}

fn clamp_generation_config(cfg: &mut GenerationConfig) {
    if let Some(t) = cfg.temperature {
        cfg.temperature = Some(clamp_round_f32(t, 0.0, 2.0, 3));
    }
    if let Some(p) = cfg.top_p {
        cfg.top_p = Some(clamp_round_f32(p, 0.0, 1.0, 4));
    }
    if let Some(stops) = &mut cfg.stop_sequences {
        stops.sort();
        stops.dedup();
        if stops.is_empty() {
            cfg.stop_sequences = None;
        }
    }
    if let Some(max) = cfg.max_output_tokens
        && max > 100_000
    {
        cfg.max_output_tokens = Some(100_000);
    }
}

/// Clean up an outgoing request: text hygiene on every content and parameter
/// clamping on the generation config. Sampling parameters left unset stay
/// unset; the service applies its own defaults.
pub fn normalize_request(mut req: GenerateContentRequest) -> GenerateContentRequest {
    for content in &mut req.contents {
        clean_content(content);
    }
    if let Some(sys) = &mut req.system_instruction {
        clean_content(sys);
    }
    if let Some(cfg) = &mut req.generation_config {
        clamp_generation_config(cfg);
    }
    req
}
