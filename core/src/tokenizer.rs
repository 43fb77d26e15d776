use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"</?[^>]*>").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","ain","all","am","an","and","any","are","aren","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","couldn","couldn't",
            "d","did","didn","didn't","do","does","doesn","doesn't","doing","don","don't","down","during",
            "each","few","for","from","further",
            "had","hadn","hadn't","has","hasn","hasn't","have","haven","haven't","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","isn","isn't","it","it's","its","itself",
            "just","ll","m","ma","me","mightn","mightn't","more","most","mustn","mustn't","my","myself",
            "needn","needn't","no","nor","not","now",
            "o","of","off","on","once","only","or","other","our","ours","ourselves","out","over","own",
            "re","s","same","shan","shan't","she","she's","should","should've","shouldn","shouldn't","so","some","such",
            "t","than","that","that'll","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","wasn","wasn't","we","were","weren","weren't","what","when","where","which","while","who","whom","why","will","with","won","won't","wouldn","wouldn't",
            "y","you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Typographic punctuation that `char::is_ascii_punctuation` does not cover.
const SMART_PUNCTUATION: &[char] = &[
    '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{2026}', '\u{00AB}', '\u{00BB}', '\u{00B7}',
];

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

pub fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || SMART_PUNCTUATION.contains(&c)
}

/// Normalize one raw description: decode entities, blank out tags and
/// newlines, apply NFKC and lowercase.
///
/// Tags become a single space so that `a<br>b` yields two tokens. Entity
/// sequences that do not decode are left as written.
pub fn clean(raw: &str) -> String {
    let unescaped = html_escape::decode_html_entities(raw);
    let untagged = TAG_RE.replace_all(&unescaped, " ");
    untagged
        .nfkc()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Clean and split on whitespace.
pub fn tokenize(raw: &str) -> Vec<String> {
    clean(raw).split_whitespace().map(str::to_string).collect()
}

/// Strip leading/trailing punctuation from each token, then drop tokens that
/// are left empty or are stopwords. Interior punctuation such as the hyphen
/// in `full-time` is kept.
pub fn filter_tokens(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|token| {
            let trimmed = token.trim_matches(is_punctuation);
            if trimmed.is_empty() || is_stopword(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Bring a user-supplied keyword into lexicon form: the same cleaning as a
/// description, then surrounding whitespace and punctuation removed.
pub fn normalize_keyword(keyword: &str) -> String {
    clean(keyword).trim().trim_matches(is_punctuation).to_string()
}
