//! FFmpeg filter-graph builders.
//!
//! The one place that must match the transcoder's exact syntax. Everything
//! upstream hands in typed specs; everything here is string assembly with
//! unit tests and no subprocess involvement.

/// Burned-in text overlays for a processed clip.
#[derive(Debug, Clone, Default)]
pub struct LabelSpec {
    /// Identifier text shown for the whole clip (frame/session/timestamp),
    /// for human audit during coding.
    pub text: String,
    /// Font file for drawtext; ffmpeg's default font when unset.
    pub font_file: Option<String>,
    /// Timed annotations as (stream time, text); each is visible from its
    /// stream time until the next annotation begins, the last until clip
    /// end. Times refer to the source stream (overlays render before any
    /// trim).
    pub annotations: Vec<(f64, String)>,
}

/// Escape text for use inside a drawtext `text='...'` argument.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | ':' | '%' => {
                out.push('\\');
                out.push(c);
            }
            '\'' => {} // quotes would terminate the argument; drop them
            _ => out.push(c),
        }
    }
    out
}

fn drawtext(label: &LabelSpec, text: &str, y: u32, enable: Option<String>) -> String {
    let mut f = String::from("drawtext=");
    if let Some(font) = &label.font_file {
        f.push_str(&format!("fontfile={}:", font));
    }
    f.push_str(&format!(
        "text='{}':fontsize=12:fontcolor=red:x=10:y={}",
        escape_drawtext(text),
        y
    ));
    if let Some(enable) = enable {
        f.push_str(&format!(":enable='{}'", enable));
    }
    f
}

/// Video chain for a labeled, optionally trimmed, video-only render.
///
/// Produces `[0:v]drawtext=...,setpts=PTS-STARTPTS[,trim,setpts][v0]`. The
/// identifier label is drawn at the top left; annotations below it.
pub fn video_label_chain(label: &LabelSpec, trim_start: Option<f64>) -> String {
    let mut chain = format!("[0:v]{}", drawtext(label, &label.text, 10, None));

    for (i, (start, text)) in label.annotations.iter().enumerate() {
        let enable = match label.annotations.get(i + 1) {
            Some((next_start, _)) => format!("between(t,{:.3},{:.3})", start, next_start),
            None => format!("gte(t,{:.3})", start),
        };
        chain.push(',');
        chain.push_str(&drawtext(label, text, 30, Some(enable)));
    }

    chain.push_str(",setpts=PTS-STARTPTS");
    if let Some(start) = trim_start {
        chain.push_str(&format!(",trim=start={:.3},setpts=PTS-STARTPTS", start));
    }
    chain.push_str("[v0]");
    chain
}

/// Audio chain for the matching audio-only render.
///
/// Pads the tail with silence so a short audio stream cannot truncate the
/// mux below the video stream's length.
pub fn audio_trim_chain(trim_start: Option<f64>) -> String {
    match trim_start {
        Some(start) => format!(
            "[0:a]atrim=start={:.3},asetpts=PTS-STARTPTS,apad=pad_len=100000[a0]",
            start
        ),
        None => "[0:a]asetpts=PTS-STARTPTS,apad=pad_len=100000[a0]".to_string(),
    }
}

/// Concat filter graph for `n` inputs.
///
/// With audio, every input contributes `[i:v][i:a]` and the graph yields
/// `[outv][outa]`; without, only video pads and `[outv]`.
pub fn concat_graph(n: usize, with_audio: bool) -> String {
    let mut graph = String::new();
    for i in 0..n {
        graph.push_str(&format!("[{}:v]", i));
        if with_audio {
            graph.push_str(&format!("[{}:a]", i));
        }
    }
    graph.push_str(&format!(
        "concat=n={}:v=1:a={}",
        n,
        if with_audio { 1 } else { 0 }
    ));
    graph.push_str("[outv]");
    if with_audio {
        graph.push_str("[outa]");
    }
    graph
}
