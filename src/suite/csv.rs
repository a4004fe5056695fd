//! CSV suite reader: `test_cases.csv`, `modules.csv`, `elements.csv` share
//! one schema (§6.1), generalized here to accept more than one
//! `Element_ID*` column or more than one row per element name — the
//! source's `read_elements` only ever returned a single id per name.

use std::collections::HashMap;

use crate::error::{Code, OpticsError};

use super::{decode_cell, SuiteReader};

pub struct CsvSuiteReader;

fn read_records(contents: &str) -> Result<Vec<csv::StringRecord>, OpticsError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(contents.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| OpticsError::new(Code::E0501, format!("invalid CSV headers: {e}")))?
        .clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| OpticsError::new(Code::E0501, format!("invalid CSV row: {e}")))?;
        rows.push(record);
    }
    let _ = headers;
    Ok(rows)
}

fn header_index(contents: &str) -> Result<HashMap<String, usize>, OpticsError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(contents.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| OpticsError::new(Code::E0501, format!("invalid CSV headers: {e}")))?;
    Ok(headers.iter().enumerate().map(|(i, h)| (h.to_string(), i)).collect())
}

impl SuiteReader for CsvSuiteReader {
    fn read_test_cases(&self, contents: &str) -> Result<HashMap<String, Vec<String>>, OpticsError> {
        let idx = header_index(contents)?;
        let Some(&tc_col) = idx.get("test_case") else {
            return Err(OpticsError::new(Code::E0501, "test_cases.csv missing 'test_case' column"));
        };
        let Some(&step_col) = idx.get("test_step") else {
            return Err(OpticsError::new(Code::E0501, "test_cases.csv missing 'test_step' column"));
        };

        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for row in read_records(contents)? {
            let test_case = row.get(tc_col).unwrap_or("").trim();
            let test_step = row.get(step_col).unwrap_or("").trim();
            if test_case.is_empty() || test_step.is_empty() {
                continue;
            }
            out.entry(test_case.to_string()).or_default().push(decode_cell(test_step));
        }
        Ok(out)
    }

    fn read_modules(&self, contents: &str) -> Result<HashMap<String, Vec<(String, Vec<String>)>>, OpticsError> {
        let idx = header_index(contents)?;
        let Some(&name_col) = idx.get("module_name") else {
            return Err(OpticsError::new(Code::E0501, "modules.csv missing 'module_name' column"));
        };
        let Some(&step_col) = idx.get("module_step") else {
            return Err(OpticsError::new(Code::E0501, "modules.csv missing 'module_step' column"));
        };
        let mut param_cols: Vec<(String, usize)> = idx
            .iter()
            .filter(|(k, _)| k.starts_with("param_"))
            .map(|(k, &i)| (k.clone(), i))
            .collect();
        param_cols.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out: HashMap<String, Vec<(String, Vec<String>)>> = HashMap::new();
        for row in read_records(contents)? {
            let module_name = row.get(name_col).unwrap_or("").trim();
            let keyword = row.get(step_col).unwrap_or("").trim();
            if module_name.is_empty() || keyword.is_empty() {
                continue;
            }
            let params: Vec<String> = param_cols
                .iter()
                .filter_map(|(_, i)| row.get(*i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(decode_cell)
                .collect();
            out.entry(module_name.to_string()).or_default().push((keyword.to_string(), params));
        }
        Ok(out)
    }

    /// Unlike the source's single-value `read_elements`, collects every
    /// non-empty `Element_ID*` column *and* every row for a repeated
    /// `Element_Name` into one ordered fallback list (§6.1).
    fn read_elements(&self, contents: &str) -> Result<HashMap<String, Vec<String>>, OpticsError> {
        let idx = header_index(contents)?;
        let Some(&name_col) = idx.get("Element_Name") else {
            return Err(OpticsError::new(Code::E0501, "elements.csv missing 'Element_Name' column"));
        };
        let mut id_cols: Vec<(String, usize)> = idx
            .iter()
            .filter(|(k, _)| k.starts_with("Element_ID"))
            .map(|(k, &i)| (k.clone(), i))
            .collect();
        id_cols.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for row in read_records(contents)? {
            let name = row.get(name_col).unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }
            for (_, i) in &id_cols {
                if let Some(v) = row.get(*i) {
                    let v = v.trim();
                    if !v.is_empty() {
                        out.entry(name.to_string()).or_default().push(decode_cell(v));
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cases_group_ordered_steps_by_name() {
        let csv = "test_case,test_step\nlogin,open_app\nlogin,press_login\nlogout,open_app\n";
        let out = CsvSuiteReader.read_test_cases(csv).unwrap();
        assert_eq!(out["login"], vec!["open_app".to_string(), "press_login".to_string()]);
        assert_eq!(out["logout"], vec!["open_app".to_string()]);
    }

    #[test]
    fn modules_collect_ordered_param_columns() {
        let csv = "module_name,module_step,param_1,param_2\nopen_app,press_element,${login_btn},extra\n";
        let out = CsvSuiteReader.read_modules(csv).unwrap();
        assert_eq!(out["open_app"], vec![("press_element".to_string(), vec!["${login_btn}".to_string(), "extra".to_string()])]);
    }

    #[test]
    fn elements_merge_multiple_id_columns_and_rows() {
        let csv = "Element_Name,Element_ID,Element_ID_2\nlogin_btn,//nonexistent,100\nlogin_btn,300,400\n";
        let out = CsvSuiteReader.read_elements(csv).unwrap();
        assert_eq!(out["login_btn"], vec!["//nonexistent".to_string(), "100".to_string(), "300".to_string(), "400".to_string()]);
    }

    #[test]
    fn missing_required_column_is_e0501() {
        let csv = "foo,bar\n1,2\n";
        let err = CsvSuiteReader.read_test_cases(csv).unwrap_err();
        assert_eq!(err.code, Code::E0501);
    }
}
