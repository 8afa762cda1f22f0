//! Part-name arithmetic for OPC packages.
//!
//! Part names are kept without a leading `/` (`xl/workbook.xml`), matching zip entry names.

const RELS_DIR: &str = "_rels";

/// Split a path into its effective segments, applying `.` and `..`. Both separators are accepted.
fn segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .fold(Vec::new(), |mut stack, segment| {
            match segment {
                "" | "." => {}
                ".." => {
                    stack.pop();
                }
                name => stack.push(name),
            }
            stack
        })
}

/// Directory and file name of a canonical part name. Root-level parts have an empty directory.
fn split_part(part: &str) -> (&str, &str) {
    part.rsplit_once('/').unwrap_or(("", part))
}

/// Normalize a part name: strip leading separators, use `/`, drop `.` and resolve `..`.
pub fn canonical_part_name(name: &str) -> String {
    segments(name).join("/")
}

/// The relationship part that describes `part` (`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`).
///
/// The package-level relationships (`_rels/.rels`) belong to the empty part name.
pub fn rels_for_part(part: &str) -> String {
    let canonical = canonical_part_name(part);
    let (dir, file_name) = split_part(&canonical);
    let rels_file = format!("{file_name}.rels");
    let mut out = segments(dir);
    out.push(RELS_DIR);
    out.push(&rels_file);
    out.join("/")
}

/// Resolve a relationship `target` written in `source_part`'s rels into a package part name.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = match target.split_once('#') {
        Some((path, _fragment)) => path,
        None => target,
    };
    if target.starts_with('/') {
        return canonical_part_name(target);
    }
    if target.is_empty() {
        return canonical_part_name(source_part);
    }
    let (dir, _) = split_part(source_part);
    canonical_part_name(&format!("{dir}/{target}"))
}

/// The relative target to write in `source_part`'s rels so that it resolves to `target_part`.
pub fn relative_target(source_part: &str, target_part: &str) -> String {
    let source = canonical_part_name(source_part);
    let base = segments(split_part(&source).0);
    let target = segments(target_part);

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out: Vec<&str> = vec![".."; base.len() - common];
    out.extend_from_slice(&target[common..]);
    out.join("/")
}

/// File extension (without the dot), lower-cased.
pub fn extension(part: &str) -> Option<String> {
    let (_, file_name) = split_part(part);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Find the stored name matching `name`: exact canonical match first, then ASCII case-insensitive.
///
/// Zip producers disagree on the case of part names (`[Content_Types].xml`,
/// `xl/SharedStrings.xml`), while OPC treats names case-insensitively.
pub fn find_part_name<'k, I>(names: I, name: &str) -> Option<&'k str>
where
    I: IntoIterator<Item = &'k str> + Clone,
{
    let canonical = canonical_part_name(name);
    names
        .clone()
        .into_iter()
        .find(|stored| *stored == canonical)
        .or_else(|| {
            names
                .into_iter()
                .find(|stored| stored.eq_ignore_ascii_case(&canonical))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_parts_sit_in_a_sibling_rels_directory() {
        assert_eq!(rels_for_part("workbook.xml"), "_rels/workbook.xml.rels");
        assert_eq!(rels_for_part("/xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_for_part(""), "_rels/.rels");
    }

    #[test]
    fn targets_resolve_against_the_source_directory() {
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../media/image1.png"),
            "xl/media/image1.png"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml#rId1"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(resolve_target("xl/workbook.xml", "#rId1"), "xl/workbook.xml");
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/../docProps/core.xml"),
            "docProps/core.xml"
        );
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn relative_target_inverts_resolve_target() {
        for (source, target) in [
            ("xl/workbook.xml", "xl/worksheets/sheet3.xml"),
            ("xl/worksheets/sheet1.xml", "xl/media/image1.png"),
            ("", "docProps/app.xml"),
            ("xl/workbook.xml", "xl/sharedStrings.xml"),
        ] {
            let rel = relative_target(source, target);
            assert_eq!(resolve_target(source, &rel), target, "{source} -> {rel}");
        }
        assert_eq!(
            relative_target("xl/workbook.xml", "xl/worksheets/sheet3.xml"),
            "worksheets/sheet3.xml"
        );
    }

    #[test]
    fn canonical_names_and_extensions() {
        assert_eq!(canonical_part_name("/xl\\worksheets/./sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(extension("_rels/.rels").as_deref(), Some("rels"));
        assert_eq!(extension("xl/media/IMAGE.PNG").as_deref(), Some("png"));
        assert_eq!(extension("xl/noext"), None);
    }

    #[test]
    fn part_lookup_prefers_exact_case() {
        let names = ["xl/sharedStrings.xml", "xl/SharedStrings.xml", "[Content_Types].xml"];
        assert_eq!(
            find_part_name(names, "/xl/SharedStrings.xml"),
            Some("xl/SharedStrings.xml")
        );
        assert_eq!(
            find_part_name(names, "[content_types].XML"),
            Some("[Content_Types].xml")
        );
        assert_eq!(find_part_name(names, "xl/styles.xml"), None);
    }
}
