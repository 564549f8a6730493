use indicatif::{ProgressBar, ProgressStyle};

pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);

    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }

    pb
}

/// Product name for progress messages, cut to fit the bar.
pub fn label(name: &str) -> String {
    const WIDTH: usize = 32;

    if name.chars().count() <= WIDTH {
        return name.to_string();
    }

    let mut cut: String = name.chars().take(WIDTH - 3).collect();
    cut.push_str("...");
    cut
}
