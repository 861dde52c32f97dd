use crate::config::MuxSection;

pub const VIDEO_INPUT_NAME: &str = "input.mp4";
pub const MUX_OUTPUT_NAME: &str = "output.mp4";

/// One subtitle track to download and embed. Order in the caller's
/// list is significant and preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleSpec {
    pub url: String,
    /// ISO 639-2 code; the mux falls back to the configured default
    /// (normally `eng`) when absent.
    pub language: Option<String>,
    /// Human-readable track title; omitted from metadata when absent.
    pub label: Option<String>,
    /// Working file name override; defaults to `sub_<i>.srt`.
    pub file_name: Option<String>,
}

impl SubtitleSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            language: None,
            label: None,
            file_name: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

pub fn subtitle_working_name(index: usize, spec: &SubtitleSpec) -> String {
    spec.file_name
        .clone()
        .unwrap_or_else(|| format!("sub_{index}.srt"))
}

/// Builds the remux token sequence embedding `sub_files` into the
/// video working file. Pure function of its inputs: video and audio
/// are stream-copied, subtitles converted to the container-compatible
/// text codec, and each subtitle input `i` is mapped to output
/// subtitle stream `i` in list order.
pub fn build_remux_command(
    sub_files: &[String],
    specs: &[SubtitleSpec],
    mux: &MuxSection,
) -> Vec<String> {
    let mut command: Vec<String> = vec!["-i".into(), VIDEO_INPUT_NAME.into()];
    for file in sub_files {
        command.push("-i".into());
        command.push(file.clone());
    }

    command.push("-c:v".into());
    command.push("copy".into());
    command.push("-c:a".into());
    command.push("copy".into());
    command.push("-c:s".into());
    command.push(mux.subtitle_codec.clone());

    command.push("-map".into());
    command.push("0:v".into());
    command.push("-map".into());
    command.push("0:a".into());

    for (index, (_, spec)) in sub_files.iter().zip(specs).enumerate() {
        command.push("-map".into());
        command.push(format!("{}:0", index + 1));
        let language = spec
            .language
            .clone()
            .unwrap_or_else(|| mux.default_language.clone());
        command.push(format!("-metadata:s:s:{index}"));
        command.push(format!("language={language}"));
        if let Some(label) = &spec.label {
            command.push(format!("-metadata:s:s:{index}"));
            command.push(format!("title={label}"));
        }
    }

    command.push(MUX_OUTPUT_NAME.into());
    command
}
