use crate::core::error::QllamaError;
use crate::handlers::HandlerKind;
use console::style;
use termimad::MadSkin;

fn box_width(max: usize) -> usize {
    let terminal_width = console::Term::stdout().size().1 as usize;
    std::cmp::min(terminal_width.saturating_sub(4), max).max(40)
}

/// Greedy word wrap by display width; words longer than `width` are split.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in line.split(' ') {
        let needed = if current.is_empty() {
            console::measure_text_width(word)
        } else {
            console::measure_text_width(&current) + 1 + console::measure_text_width(word)
        };
        if needed <= width {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for ch in word.chars() {
            let mut buf = [0u8; 4];
            let ch_width = console::measure_text_width(ch.encode_utf8(&mut buf));
            if console::measure_text_width(&current) + ch_width > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
    }
    lines.push(current);
    lines
}

fn looks_like_markdown(text: &str) -> bool {
    text.contains("```") || text.contains('*') || text.contains('`') || text.contains('#')
}

pub fn display_banner(model: &str, model_id: &str, kind: HandlerKind, device: &str) {
    println!(
        "\n{} {}",
        style("qllama chat with").bold(),
        style(model).bold().magenta()
    );
    println!(
        "{}",
        style(format!("{} model {} on {}", kind, model_id, device)).dim()
    );
    println!("Type 'exit' or 'quit' to end the conversation, '/help' for commands.");
    if kind == HandlerKind::Vision {
        println!("To include images: <image:/path/to/image.jpg> or <image:https://example.com/image.jpg>");
        println!("To include videos: <video:/path/to/video.mp4>");
    }
    println!();
}

pub fn display_loading(model_id: &str) {
    println!("{} {}...", style("Loading").bold().cyan(), model_id);
}

pub fn display_loaded(model_id: &str) {
    println!("{} {} loaded successfully!", style("✓").bold().green(), model_id);
}

/// Display a model response in a formatted box
pub fn display_response(response: &str) {
    if looks_like_markdown(response) {
        display_markdown(response);
        return;
    }

    let max_width = box_width(120);
    let wrapped: Vec<String> = response
        .lines()
        .flat_map(|line| wrap_line(line, max_width.saturating_sub(4)))
        .collect();

    let content_max_len = wrapped
        .iter()
        .map(|line| console::measure_text_width(line))
        .max()
        .unwrap_or(0);
    let width = std::cmp::min(max_width, content_max_len + 4);

    let top_border = "┌".to_string() + &"─".repeat(width - 2) + "┐";
    let bottom_border = "└".to_string() + &"─".repeat(width - 2) + "┘";

    println!("\n{}", style("qllama").bold().blue());
    println!("{}", style(&top_border).dim().blue());
    for line in wrapped {
        let padding = width.saturating_sub(console::measure_text_width(&line) + 3);
        println!("│ {}{}│", style(&line).white(), " ".repeat(padding));
    }
    println!("{}", style(&bottom_border).dim().blue());
}

pub fn display_markdown(response: &str) {
    println!("\n{}", style("qllama").bold().blue());
    MadSkin::default().print_text(response);
}

pub fn display_command_output(output: &str) {
    println!("{}", output);
}

pub fn display_error(err: &QllamaError) {
    eprintln!("{} {}", style("Error:").bold().red(), err);
}

pub fn display_interrupted() {
    println!("\n{}", style("Generation interrupted.").yellow());
}

pub fn display_interrupt_hint() {
    println!("{}", style("Operation interrupted. Type 'exit' to quit.").dim());
}

pub fn display_goodbye() {
    println!("Exiting qllama. Goodbye!");
}

pub fn display_model_list(models: &[(&str, HandlerKind, &str)]) {
    println!("{}", style("Available models:").bold().underlined());
    for (name, kind, default_id) in models {
        println!(
            "  - {} {} {}",
            style(name).bold().cyan(),
            style(format!("({})", kind)).dim(),
            default_id
        );
    }
}

pub fn display_check(name: &str, ok: bool, critical: bool, detail: &str) {
    let marker = match (ok, critical) {
        (true, _) => style("✓").bold().green(),
        (false, true) => style("✗").bold().red(),
        (false, false) => style("!").bold().yellow(),
    };
    println!("{} {:<10} {}", marker, name, detail);
}
