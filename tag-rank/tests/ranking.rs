use ctagnav_tag_rank::RankContext;
use ctagnav_tag_rank::SyntaxTable;
use ctagnav_tag_rank::extract_receiver_chain;
use ctagnav_tag_rank::rank_and_filter;
use ctagnav_tag_store::FilterSet;
use ctagnav_tag_store::parse_tag_lines;
use pretty_assertions::assert_eq;
use std::path::Path;

const TAGS: &str = "\
getSum\t.\\a_folder\\DemoClass.java\t/^\tprivate int getSum(int a, int b) {$/;\"\tm\tclass:DemoClass\tfile:
getSum\t.\\a_folder\\Helpers.java\t/^\tpublic static int getSum(int a, int b) {$/;\"\tm\tclass:Helpers
";

fn syntax_table() -> SyntaxTable {
    serde_json::from_str(
        r#"{
            "source.java": {
                "member_exp": {
                    "open": ["\\(", "\\[", "\\{"],
                    "close": ["\\)", "\\]", "\\}"],
                    "stop": ["\\s", ",", ";", "=", "!", "&&", "\\|\\|"],
                    "splitters": ["\\."],
                    "this": ["this", "super"]
                },
                "reference_types": {
                    "__symbol__\\(": ["m", "f"],
                    "\\bnew\\s+__symbol__": ["c"]
                }
            }
        }"#,
    )
    .expect("syntax table")
}

#[test]
fn definition_in_referencing_file_ranks_first() {
    let table = syntax_table();
    let line = "\t\tSystem.out.printf(\"Sum %d\\n\", demo.getSum(5,6));";
    let column = line.find("getSum").expect("symbol on line");
    let chain = extract_receiver_chain(&line[..column], "source.java", &table);
    assert_eq!(chain, vec!["demo"]);

    let tags = parse_tag_lines(TAGS.lines(), &FilterSet::default(), "symbol", Path::new("/proj"));
    let candidates = tags["getSum"].clone();
    let context = RankContext::new("getSum", line)
        .with_receiver_chain(chain)
        .with_file_name("/proj/a_folder/DemoClass.java")
        .with_syntax(table.resolve("source.java"));

    let ranked = rank_and_filter(candidates, context);
    let files: Vec<_> = ranked.iter().map(|tag| tag.record.filename()).collect();
    assert_eq!(
        files,
        vec![".\\a_folder\\DemoClass.java", ".\\a_folder\\Helpers.java"]
    );
}

#[test]
fn receiver_named_like_file_wins() {
    let table = syntax_table();
    let tags = parse_tag_lines(TAGS.lines(), &FilterSet::default(), "symbol", Path::new("/proj"));
    let line = "int s = helpers.getSum(1, 2);";
    let column = line.find("getSum").expect("symbol on line");
    let chain = extract_receiver_chain(&line[..column], "source.java", &table);

    let context = RankContext::new("getSum", line)
        .with_receiver_chain(chain)
        .with_file_name("/proj/Main.java")
        .with_syntax(table.resolve("source.java"));
    let ranked = rank_and_filter(tags["getSum"].clone(), context);
    assert_eq!(ranked[0].record.filename(), ".\\a_folder\\Helpers.java");
}
