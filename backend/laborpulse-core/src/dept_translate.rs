// src/dept_translate.rs
use crate::labor_model::OprSeq;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static DEFAULT_TABLE: Lazy<BTreeMap<OprSeq, Vec<String>>> = Lazy::new(|| {
    [
        (175, vec!["COR"]),
        (200, vec!["KIT"]),
        (220, vec!["LU"]),
        (300, vec!["A/C"]),
        (440, vec!["TRIM"]),
        (450, vec!["Honda AS"]),
        (460, vec!["ASMBY"]),
        (520, vec!["PAINT", "PPREP", "FINISHING"]),
    ]
    .into_iter()
    .map(|(opr_seq, depts)| (opr_seq, depts.into_iter().map(String::from).collect()))
    .collect()
});

/// Department code to operation sequence table. Iteration is in ascending
/// operation-sequence order, so lookups resolve to the lowest matching sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeptTranslate(BTreeMap<OprSeq, Vec<String>>);

impl Default for DeptTranslate {
    fn default() -> Self {
        Self(DEFAULT_TABLE.clone())
    }
}

impl DeptTranslate {
    #[cfg(test)]
    pub fn new(table: BTreeMap<OprSeq, Vec<String>>) -> Self {
        Self(table)
    }

    /// Parses a JSON object such as `{"220": ["LU"], "520": ["PAINT", "PPREP"]}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn opr_seq_for_dept(&self, dept: &str) -> Option<OprSeq> {
        let dept = dept.trim();
        self.0
            .iter()
            .find(|(_, depts)| depts.iter().any(|d| d == dept))
            .map(|(opr_seq, _)| *opr_seq)
    }

    #[cfg(test)]
    pub fn depts_for(&self, opr_seq: OprSeq) -> Option<&[String]> {
        self.0.get(&opr_seq).map(Vec::as_slice)
    }

    pub fn table(&self) -> &BTreeMap<OprSeq, Vec<String>> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_maps_shop_departments() {
        let table = DeptTranslate::default();
        assert_eq!(table.opr_seq_for_dept("LU"), Some(220));
        assert_eq!(table.opr_seq_for_dept("PPREP"), Some(520));
        assert_eq!(table.opr_seq_for_dept(" TRIM "), Some(440));
        assert_eq!(table.opr_seq_for_dept("Layup"), None);
        assert_eq!(table.depts_for(520).map(|d| d.len()), Some(3));
    }

    #[test]
    fn first_matching_sequence_wins() {
        let table = DeptTranslate::from_json(r#"{"300": ["SHARED"], "200": ["SHARED", "KIT"]}"#)
            .expect("valid table");
        assert_eq!(table.opr_seq_for_dept("SHARED"), Some(200));
    }

    #[test]
    fn serializes_with_string_keys() {
        let table = DeptTranslate::new(BTreeMap::from([(220, vec!["LU".to_string()])]));
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"220":["LU"]}"#);
    }
}
