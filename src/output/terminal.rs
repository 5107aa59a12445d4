// Colored terminal output for verdicts.
//
// The `analyze` subcommand delegates here; the web server never prints.

use colored::Colorize;

use crate::scoring::verdict::{ToxicityVerdict, TOXICITY_THRESHOLD};
use crate::toxicity::traits::Category;

/// Display a verdict with a per-category breakdown.
pub fn display_verdict(text: &str, verdict: &ToxicityVerdict) {
    println!(
        "\n{}",
        format!("=== Analysis: \"{}\" ===", super::truncate_chars(text, 60)).bold()
    );

    let headline = if verdict.is_toxic {
        "TOXIC".red().bold()
    } else {
        "clean".green().bold()
    };
    println!(
        "  Verdict: {}   Overall score: {}",
        headline,
        colorize_score(verdict.overall_score)
    );
    println!();

    println!(
        "  {:<20} {:>7}  {}",
        "Category".dimmed(),
        "Score".dimmed(),
        "".dimmed()
    );
    println!("  {}", "-".repeat(52).dimmed());

    for category in Category::ALL {
        let score = verdict.all_scores.get(category).unwrap_or(0.0);
        let marker = if score >= TOXICITY_THRESHOLD {
            "detected".red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<20} {:>7.3}  {} {}",
            category.label(),
            score,
            bar(score).dimmed(),
            marker
        );
    }
    println!();
}

/// A 20-cell bar for a 0-1 probability.
fn bar(score: f64) -> String {
    let filled = (score.clamp(0.0, 1.0) * 20.0).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(20 - filled))
}

/// Colorize an overall 0-100 score.
fn colorize_score(score: f64) -> colored::ColoredString {
    let text = format!("{score:.1}/100");
    if score >= 75.0 {
        text.red().bold()
    } else if score >= 50.0 {
        text.bright_red()
    } else if score >= 25.0 {
        text.yellow()
    } else {
        text.green()
    }
}
