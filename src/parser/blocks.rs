use regex::Regex;

/// Text attributed to one course offering, from its header to the next header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Split page text at every header match. Text before the first header is dropped.
pub fn split_blocks<'a>(text: &'a str, header: &Regex) -> Vec<Block<'a>> {
    let starts: Vec<usize> = header.find_iter(text).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            Block {
                start,
                end,
                text: &text[start..end],
            }
        })
        .collect()
}
