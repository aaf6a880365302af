//! Local MARC21 binary file fetcher.
//!
//! Streams sequential MARC21 records from a local or `file:`-scheme
//! path. No pagination: each record is length-prefixed by its leader,
//! so the reader pulls one record at a time until EOF.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use mdharvest_core::{FetchError, Record};
use serde_json::{Value, json};

use crate::Fetcher;

const LEADER_LEN: usize = 24;
const DIRECTORY_ENTRY_LEN: usize = 12;
const FIELD_TERMINATOR: u8 = 0x1e;
const SUBFIELD_DELIMITER: u8 = 0x1f;

const OBJSET_SIZE: usize = 100;

pub struct MarcFileFetcher {
    reader: BufReader<File>,
    done: bool,
}

impl std::fmt::Debug for MarcFileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarcFileFetcher").finish_non_exhaustive()
    }
}

impl MarcFileFetcher {
    pub fn new(url_harvest: &str) -> Result<Self, FetchError> {
        let path = file_path(url_harvest);
        let file = File::open(Path::new(path))?;
        Ok(Self {
            reader: BufReader::new(file),
            done: false,
        })
    }

    /// Read the next raw MARC record, or `None` at EOF.
    fn read_raw(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        let mut leader = [0u8; LEADER_LEN];
        match self.reader.read_exact(&mut leader) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let record_len = ascii_number(&leader[0..5]).ok_or_else(|| {
            FetchError::Decode("MARC leader with non-numeric record length".to_string())
        })?;
        if record_len < LEADER_LEN {
            return Err(FetchError::Decode(format!(
                "MARC record length {record_len} shorter than leader"
            )));
        }
        let mut record = vec![0u8; record_len];
        record[..LEADER_LEN].copy_from_slice(&leader);
        self.reader.read_exact(&mut record[LEADER_LEN..])?;
        Ok(Some(record))
    }
}

impl Fetcher for MarcFileFetcher {
    fn next_record(&mut self) -> Result<Option<Record>, FetchError> {
        if self.done {
            return Ok(None);
        }
        match self.read_raw()? {
            Some(raw) => Ok(Some(decode_record(&raw)?)),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError> {
        let mut objset = Vec::new();
        while objset.len() < OBJSET_SIZE {
            match self.next_record()? {
                Some(rec) => objset.push(rec),
                None => break,
            }
        }
        if objset.is_empty() {
            return Ok(None);
        }
        Ok(Some(objset))
    }
}

fn file_path(url: &str) -> &str {
    match url.strip_prefix("file:") {
        Some(rest) => rest.strip_prefix("//").unwrap_or(rest),
        None => url,
    }
}

fn ascii_number(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

/// Decode one binary MARC21 record into the normalized
/// `{leader, fields}` shape: control fields (tag < 010) as
/// `{tag: value}`, variable fields as `{tag: {ind1, ind2, subfields}}`.
fn decode_record(raw: &[u8]) -> Result<Record, FetchError> {
    let leader = String::from_utf8_lossy(&raw[..LEADER_LEN]).into_owned();
    let base = ascii_number(&raw[12..17])
        .filter(|&b| b > LEADER_LEN && b <= raw.len())
        .ok_or_else(|| FetchError::Decode("MARC leader with bad base address".to_string()))?;
    let data = &raw[base..];

    let mut fields = Vec::new();
    let mut dir = &raw[LEADER_LEN..base.saturating_sub(1)];
    while dir.len() >= DIRECTORY_ENTRY_LEN {
        let entry = &dir[..DIRECTORY_ENTRY_LEN];
        dir = &dir[DIRECTORY_ENTRY_LEN..];

        let tag = String::from_utf8_lossy(&entry[0..3]).into_owned();
        let len = ascii_number(&entry[3..7])
            .ok_or_else(|| FetchError::Decode(format!("bad directory length for tag {tag}")))?;
        let start = ascii_number(&entry[7..12])
            .ok_or_else(|| FetchError::Decode(format!("bad directory offset for tag {tag}")))?;
        if start + len > data.len() {
            return Err(FetchError::Decode(format!(
                "directory entry for tag {tag} outside record data"
            )));
        }
        let mut field = &data[start..start + len];
        if field.last() == Some(&FIELD_TERMINATOR) {
            field = &field[..field.len() - 1];
        }
        fields.push(decode_field(&tag, field));
    }

    let mut record = Record::new();
    record.insert("leader".to_string(), Value::String(leader));
    record.insert("fields".to_string(), Value::Array(fields));
    Ok(record)
}

fn decode_field(tag: &str, field: &[u8]) -> Value {
    // control fields have no indicators or subfields
    if tag < "010" {
        return json!({ tag: String::from_utf8_lossy(field).into_owned() });
    }
    let ind1 = field.first().map(|&b| (b as char).to_string()).unwrap_or_default();
    let ind2 = field.get(1).map(|&b| (b as char).to_string()).unwrap_or_default();
    let subfields: Vec<Value> = field
        .get(2..)
        .unwrap_or(&[])
        .split(|&b| b == SUBFIELD_DELIMITER)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let code = (piece[0] as char).to_string();
            let value = String::from_utf8_lossy(&piece[1..]).into_owned();
            json!({ code: value })
        })
        .collect();
    json!({ tag: { "ind1": ind1, "ind2": ind2, "subfields": subfields } })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    enum TestField<'a> {
        Control(&'a str, &'a str),
        Data(&'a str, &'a str, &'a str, &'a [(&'a str, &'a str)]),
    }

    fn encode_record(fields: &[TestField]) -> Vec<u8> {
        let mut directory = Vec::new();
        let mut data = Vec::new();
        for field in fields {
            let start = data.len();
            let (tag, body) = match field {
                TestField::Control(tag, value) => (*tag, value.as_bytes().to_vec()),
                TestField::Data(tag, ind1, ind2, subfields) => {
                    let mut body = Vec::new();
                    body.extend_from_slice(ind1.as_bytes());
                    body.extend_from_slice(ind2.as_bytes());
                    for (code, value) in *subfields {
                        body.push(SUBFIELD_DELIMITER);
                        body.extend_from_slice(code.as_bytes());
                        body.extend_from_slice(value.as_bytes());
                    }
                    (*tag, body)
                }
            };
            data.extend_from_slice(&body);
            data.push(FIELD_TERMINATOR);
            let len = data.len() - start;
            directory.extend_from_slice(format!("{tag}{len:04}{start:05}").as_bytes());
        }
        directory.push(FIELD_TERMINATOR);

        let base = LEADER_LEN + directory.len();
        let record_len = base + data.len() + 1;
        let leader = format!("{record_len:05}nkm a22{base:05}ia 4500");
        assert_eq!(leader.len(), LEADER_LEN);

        let mut record = leader.into_bytes();
        record.extend_from_slice(&directory);
        record.extend_from_slice(&data);
        record.push(0x1d);
        record
    }

    fn sample_record(id: &str, title: &str) -> Vec<u8> {
        encode_record(&[
            TestField::Control("001", id),
            TestField::Data("245", "1", "0", &[("a", title)]),
        ])
    }

    fn write_marc_file(records: &[Vec<u8>]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for rec in records {
            file.write_all(rec).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_records_until_eof() {
        let file = write_marc_file(&[
            sample_record("rec-1", "First title"),
            sample_record("rec-2", "Second title"),
        ]);
        let url = format!("file:{}", file.path().display());
        let mut fetcher = MarcFileFetcher::new(&url).unwrap();

        let rec = fetcher.next_record().unwrap().unwrap();
        let fields = rec["fields"].as_array().unwrap();
        assert_eq!(fields[0]["001"], "rec-1");
        assert_eq!(fields[1]["245"]["ind1"], "1");
        assert_eq!(fields[1]["245"]["subfields"][0]["a"], "First title");

        let rec = fetcher.next_record().unwrap().unwrap();
        assert_eq!(rec["fields"][0]["001"], "rec-2");

        assert!(fetcher.next_record().unwrap().is_none());
        assert!(fetcher.next_record().unwrap().is_none());
    }

    #[test]
    fn leader_is_preserved_verbatim() {
        let raw = sample_record("rec-1", "A title");
        let expected_leader = String::from_utf8_lossy(&raw[..LEADER_LEN]).into_owned();
        let file = write_marc_file(&[raw]);
        let mut fetcher = MarcFileFetcher::new(&file.path().display().to_string()).unwrap();
        let rec = fetcher.next_record().unwrap().unwrap();
        assert_eq!(rec["leader"], expected_leader);
    }

    #[test]
    fn next_objset_collects_all_records() {
        let records: Vec<Vec<u8>> = (0..10)
            .map(|i| sample_record(&format!("rec-{i}"), &format!("Title {i}")))
            .collect();
        let file = write_marc_file(&records);
        let url = format!("file://{}", file.path().display());
        let mut fetcher = MarcFileFetcher::new(&url).unwrap();
        let objset = fetcher.next_objset().unwrap().unwrap();
        assert_eq!(objset.len(), 10);
        assert!(fetcher.next_objset().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MarcFileFetcher::new("file:/no/such/marc-file").unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }

    #[test]
    fn truncated_record_is_decode_or_io_error() {
        let mut raw = sample_record("rec-1", "A title");
        raw.truncate(raw.len() - 10);
        let file = write_marc_file(&[raw]);
        let mut fetcher = MarcFileFetcher::new(&file.path().display().to_string()).unwrap();
        assert!(fetcher.next_record().is_err());
    }
}
