use std::path::PathBuf;

use apiconnector_delimited::{DelimitedError, DelimitedSerializer, Delimiter};
use rstest::rstest;

fn write_fixture(name: &str, content: &str) -> anyhow::Result<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("delimited");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

#[test]
fn should_read_comma_separated_file() -> anyhow::Result<()> {
    let path = write_fixture("comma.csv", "a,b,c\n1,2,3\n")?;

    let data = DelimitedSerializer.deserialize(&path)?;

    assert_eq!(data.delimiter, Delimiter::Comma);
    assert_eq!(data.rows, [["a", "b", "c"], ["1", "2", "3"]]);
    assert_eq!(data.path, path);
    Ok(())
}

#[rstest]
#[case::tab("tab.tsv", "age\tincome\n1\t4\n", Delimiter::Tab)]
#[case::pipe("pipe.txt", "age|income\n1|4\n", Delimiter::Pipe)]
#[case::colon("colon.txt", "age:income\n1:4\n", Delimiter::Colon)]
fn should_detect_supported_delimiters(
    #[case] name: &str,
    #[case] content: &str,
    #[case] expected: Delimiter,
) -> anyhow::Result<()> {
    let path = write_fixture(name, content)?;

    let data = DelimitedSerializer.deserialize(&path)?;

    assert_eq!(data.delimiter, expected);
    assert_eq!(data.rows, [["age", "income"], ["1", "4"]]);
    Ok(())
}

#[test]
fn should_reject_unsupported_delimiter() -> anyhow::Result<()> {
    let path = write_fixture("tilde.txt", "a~b~c\n1~2~3\n")?;

    let result = DelimitedSerializer.deserialize(&path);

    assert!(matches!(
        result,
        Err(DelimitedError::UnsupportedDelimiter { delimiter: '~' })
    ));
    Ok(())
}

#[test]
fn should_detect_on_the_first_bytes_only() -> anyhow::Result<()> {
    // the tail switches to ';' past the detection sample
    let mut content = "x,y\n".to_string();
    while content.len() < 8192 {
        content.push_str("10,20\n");
    }
    content.push_str("30;40\n");
    let path = write_fixture("long.csv", &content)?;

    let data = DelimitedSerializer.deserialize(&path)?;

    assert_eq!(data.delimiter, Delimiter::Comma);
    assert_eq!(data.rows.last().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn should_fail_on_missing_file() {
    let result = DelimitedSerializer.deserialize("does/not/exist.csv");

    assert!(matches!(result, Err(DelimitedError::Io(_))));
}
