use super::verdict::AudienceLabel;

/// One parsed classification block from a model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBlock {
    pub label: AudienceLabel,
    pub score: u8,
    pub evidence: Vec<String>,
    pub caveats: Vec<String>,
}

enum Section {
    None,
    Evidence,
    Caveats,
}

/// Split a response into blocks on `---` delimiter lines and parse each one.
/// Blocks without a CLASSIFICATION line (preamble, echoes) are dropped, so
/// the result can be shorter than the number of candidates asked about.
pub fn parse_response(text: &str) -> Vec<ParsedBlock> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim() == "---" {
            if let Some(block) = parse_block(&current) {
                blocks.push(block);
            }
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if let Some(block) = parse_block(&current) {
        blocks.push(block);
    }
    blocks
}

fn parse_block(block: &str) -> Option<ParsedBlock> {
    let mut label = None;
    let mut score = 0u8;
    let mut evidence = Vec::new();
    let mut caveats = Vec::new();
    let mut section = Section::None;

    for raw_line in block.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let upper = line.to_uppercase();
        if upper.starts_with("CLASSIFICATION:") {
            label = Some(AudienceLabel::from_wire(&line["CLASSIFICATION:".len()..]));
            section = Section::None;
        } else if upper.starts_with("SCORE:") {
            score = parse_score(line);
            section = Section::None;
        } else if upper.starts_with("SIGNALS USED:") {
            section = Section::Evidence;
        } else if upper.starts_with("UNCERTAINTIES:") {
            section = Section::Caveats;
        } else if let Some(bullet) = line.strip_prefix('-') {
            let item = bullet.trim();
            if item.is_empty() || item.eq_ignore_ascii_case("none") {
                continue;
            }
            match section {
                Section::Evidence => evidence.push(item.to_string()),
                Section::Caveats => caveats.push(item.to_string()),
                Section::None => {}
            }
        }
    }

    label.map(|label| ParsedBlock {
        label,
        score,
        evidence,
        caveats,
    })
}

/// First integer on the line, clamped to 0..=100. Missing numbers read as 0.
fn parse_score(line: &str) -> u8 {
    let digits: String = line
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u32>() {
        Ok(value) => value.min(100) as u8,
        Err(_) => 0,
    }
}
