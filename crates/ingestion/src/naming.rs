//! Column names and material dataset ids derived from source names.

/// Camel-cased column name for a file stem or attribute.
///
/// Words are split on runs of `_`, `-` and whitespace. The first word keeps
/// its characters with only the first one lower-cased; later words are
/// title-cased.
///
/// ```
/// use ingestion::naming::column_slug;
///
/// assert_eq!(column_slug("cropA"), "cropA");
/// assert_eq!(column_slug("spam2010V2r0_global_P_WHEA_A"), "spam2010V2r0GlobalPWheaA");
/// assert_eq!(column_slug("water-stress index"), "waterStressIndex");
/// ```
pub fn column_slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let words = s
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty());
    for (i, word) in words.enumerate() {
        let mut chars = word.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        if i == 0 {
            out.extend(first.to_lowercase());
            out.push_str(chars.as_str());
        } else {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

/// Lower snake case: `_` goes before every upper-case character except a
/// leading one.
pub fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

const PER_TONNE_PRODUCTION_SUFFIX: &str = "PerTProduction";

/// Versioned rules mapping a grid column to a material `"datasetId"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetIdConvention {
    /// `dataset + "_" + ` the second-to-last snake token of the column.
    SnakeSuffixV1,
    /// `"spam_" + ` the lower-cased column prefix before `PerTProduction`.
    PerTonneProductionV1,
}

impl DatasetIdConvention {
    /// Dataset id for `column`, or `None` when the column does not follow
    /// the convention.
    pub fn dataset_id(&self, dataset: &str, column: &str) -> Option<String> {
        match self {
            DatasetIdConvention::SnakeSuffixV1 => {
                let snake = snake_case(column);
                let tokens: Vec<&str> = snake.split('_').collect();
                if tokens.len() < 2 {
                    return None;
                }
                let token = tokens[tokens.len() - 2];
                if token.is_empty() {
                    return None;
                }
                Some(format!("{dataset}_{token}"))
            }
            DatasetIdConvention::PerTonneProductionV1 => {
                let (prefix, _) = column.split_once(PER_TONNE_PRODUCTION_SUFFIX)?;
                if prefix.is_empty() {
                    return None;
                }
                Some(format!("spam_{}", prefix.to_lowercase()))
            }
        }
    }

    /// Whether only root materials (no parent) match.
    pub fn roots_only(&self) -> bool {
        matches!(self, DatasetIdConvention::PerTonneProductionV1)
    }
}
