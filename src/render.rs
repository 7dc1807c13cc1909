use crate::{
    algorithm::{AlignedPair, ModelParams},
    signature::DumpSignature,
    Result,
};
use std::io;
use unicode_width::UnicodeWidthStr;

const SEPARATOR: &str = "  |  ";
const TICK: &str = "▇";
const SLIM_TICK: &str = "▏";

fn push_word_chunks(lines: &mut Vec<String>, word: &str, width: usize) {
    let mut chunk = String::new();
    for c in word.chars() {
        if !chunk.is_empty() && chunk.width() + c.to_string().width() > width {
            lines.push(std::mem::take(&mut chunk));
        }
        chunk.push(c);
    }
    lines.push(chunk);
}

/// Greedy word wrap. Words wider than `width` are broken up.
pub fn wrap(words: &[String], width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines: Vec<String> = vec![];
    let mut current = String::new();
    for word in words {
        if !current.is_empty() {
            if current.width() + 1 + word.width() <= width {
                current.push(' ');
                current.push_str(word);
                continue;
            }
            lines.push(std::mem::take(&mut current));
        }
        if word.width() <= width {
            current.push_str(word);
        } else {
            push_word_chunks(&mut lines, word, width);
            current = lines.pop().unwrap_or_default();
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn side_lines(signature: &DumpSignature, width: usize) -> Vec<String> {
    let mut lines = vec![];
    for run in signature.runs() {
        lines.push(run.component.clone());
        lines.extend(wrap(&run.tokens, width));
    }
    lines
}

/// Prints two signatures in columns, each run as its component name
/// followed by its wrapped function tokens.
pub fn print_side_by_side(signatures: [&DumpSignature; 2], width: usize, output: &mut impl io::Write) -> Result<()> {
    let lines = signatures.map(|signature| side_lines(signature, width));
    writeln!(output)?;
    for i in 0..std::cmp::max(lines[0].len(), lines[1].len()) {
        let left = lines[0].get(i).map_or("", String::as_str);
        let right = lines[1].get(i).map_or("", String::as_str);
        let padding = " ".repeat(width.saturating_sub(left.width()));
        let row = format!("{left}{padding}{SEPARATOR}{right}");
        writeln!(output, "{}", row.trim_end())?;
    }
    writeln!(output)?;
    Ok(())
}

/// Prints the similarity as the fraction it is computed from.
pub fn print_formula(pair: &AlignedPair, params: ModelParams, output: &mut impl io::Write) -> Result<()> {
    if pair.features.is_empty() {
        writeln!(output, "Similarity = 0.00%")?;
        writeln!(output)?;
        return Ok(());
    }
    let numerator = pair
        .features
        .iter()
        .map(|feature| format!("e^-{:?}*{}*e^-{:.1}*{:.4}", params.m, feature.position, params.n, feature.distance))
        .collect::<Vec<_>>()
        .join(" + ");
    let denominator = (0..pair.max_len)
        .map(|k| format!("e^-{:?}*{k}", params.m))
        .collect::<Vec<_>>()
        .join(" + ");
    let bar = "-".repeat(std::cmp::max(numerator.len(), denominator.len()));
    let indent = " ".repeat("Similarity = ".len());
    writeln!(output, "{indent}{numerator}")?;
    writeln!(output, "Similarity = {bar} = {:.2}%", pair.similarity(params) * 100.0)?;
    writeln!(output, "{indent}{denominator}")?;
    writeln!(output)?;
    Ok(())
}

/// Horizontal bar chart of `counts`, which are sorted most common first.
/// The longest bar spans `width` cells.
pub fn print_chart(counts: &[(String, usize)], width: usize, output: &mut impl io::Write) -> Result<()> {
    let Some(&(_, max_count)) = counts.first() else {
        return Ok(());
    };
    writeln!(output)?;
    for (name, count) in counts {
        let cells = count * width / max_count.max(1);
        let bar = if cells >= 1 { TICK.repeat(cells) } else { SLIM_TICK.to_owned() };
        writeln!(output, "{bar} {name}:{count}")?;
    }
    writeln!(output)?;
    Ok(())
}
