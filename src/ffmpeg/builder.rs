use super::ConversionSettings;

/// MPEG-2 video + MPEG-1 Layer II audio: plays on practically every player and TV.
pub const VIDEO_CODEC: &str = "mpeg2video";
pub const AUDIO_CODEC: &str = "mp2";

/// Scale the cover to fit inside `width`x`height` without cropping, then pad to exactly
/// that size with the image centered.
pub fn scale_pad_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format=yuv420p",
        w = width,
        h = height
    )
}

/// Arguments for one still-image + audio encode. The output path is always last.
pub fn build_conversion_args(
    cover_image_path: &str,
    audio_path: &str,
    output_path: &str,
    settings: &ConversionSettings,
) -> Vec<String> {
    let (width, height) = settings.effective_resolution();
    let fps = settings.effective_fps();

    log::debug!(
        target: "audio2video::ffmpeg::builder",
        "Building FFmpeg command: {}x{}@{}, video={}, audio={}, cover={}, input={} -> output={}",
        width,
        height,
        fps,
        settings.effective_video_bitrate(),
        settings.effective_audio_bitrate(),
        cover_image_path,
        audio_path,
        output_path
    );

    vec![
        "-y".to_string(),
        "-loop".to_string(),
        "1".to_string(),
        "-i".to_string(),
        cover_image_path.to_string(),
        "-i".to_string(),
        audio_path.to_string(),
        "-c:v".to_string(),
        VIDEO_CODEC.to_string(),
        "-c:a".to_string(),
        AUDIO_CODEC.to_string(),
        "-b:v".to_string(),
        settings.effective_video_bitrate().to_string(),
        "-b:a".to_string(),
        settings.effective_audio_bitrate().to_string(),
        "-vf".to_string(),
        scale_pad_filter(width, height),
        "-r".to_string(),
        fps.to_string(),
        "-shortest".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        output_path.to_string(),
    ]
}

/// Formats args for readable display: option and value on the same line when the next arg is a value.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let line = if arg.starts_with('-') && i + 1 < args.len() && !args[i + 1].starts_with('-')
        {
            let value = &args[i + 1];
            i += 2;
            format!("  {} {}", arg, value)
        } else {
            i += 1;
            format!("  {}", arg)
        };
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn default_settings_produce_expected_args() {
        let args = build_conversion_args(
            "/in/cover.png",
            "/in/track.mp3",
            "/out/track.mpg",
            &ConversionSettings::default(),
        );
        assert_eq!(args[0], "-y");
        assert_eq!(value_after(&args, "-loop"), "1");
        assert_eq!(value_after(&args, "-c:v"), "mpeg2video");
        assert_eq!(value_after(&args, "-c:a"), "mp2");
        assert_eq!(value_after(&args, "-b:v"), "4000k");
        assert_eq!(value_after(&args, "-b:a"), "192k");
        assert_eq!(value_after(&args, "-r"), "30");
        assert_eq!(value_after(&args, "-progress"), "pipe:1");
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"-nostats".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/out/track.mpg"));
    }

    #[test]
    fn image_input_precedes_audio_input() {
        let args =
            build_conversion_args("/c.jpg", "/a.wav", "/o.mpg", &ConversionSettings::default());
        let inputs: Vec<&str> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(inputs, vec!["/c.jpg", "/a.wav"]);
        let loop_idx = args.iter().position(|a| a == "-loop").unwrap();
        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert!(loop_idx < first_input, "-loop must apply to the image input");
    }

    #[test]
    fn filter_follows_resolution() {
        let settings = ConversionSettings {
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };
        let args = build_conversion_args("/c.jpg", "/a.wav", "/o.mpg", &settings);
        assert_eq!(
            value_after(&args, "-vf"),
            "scale=1920:1080:force_original_aspect_ratio=decrease,pad=1920:1080:(ow-iw)/2:(oh-ih)/2,format=yuv420p"
        );
    }

    #[test]
    fn display_multiline_pairs_flags_with_values() {
        let args: Vec<String> = ["-y", "-i", "/a.wav", "-shortest", "/o.mpg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            format_args_for_display_multiline(&args),
            "  -y\n  -i /a.wav\n  -shortest /o.mpg"
        );
    }
}
