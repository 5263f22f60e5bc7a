use std::collections::BTreeMap;
use std::sync::Arc;

use crate::filters::BoxedFilter;
use crate::tags::{
    Assign, Block, Capture, Case, Comment, Counter, Cycle, Echo, Embed, For, If, IfChanged,
    Include, InlineComment, Interrupt, LiquidTag, LoopControl, RenderTag, TableRow, Tag,
};

/// The standard tags.
///
/// `raw` is not in here as the lexer takes care of it.
pub(crate) fn get_builtin_tags() -> BTreeMap<String, Arc<dyn Tag>> {
    let mut rv: BTreeMap<String, Arc<dyn Tag>> = BTreeMap::new();
    let mut add = |name: &str, tag: Arc<dyn Tag>| {
        rv.insert(name.to_string(), tag);
    };
    add("assign", Arc::new(Assign));
    add("capture", Arc::new(Capture));
    add("increment", Arc::new(Counter { step: 1 }));
    add("decrement", Arc::new(Counter { step: -1 }));
    add("if", Arc::new(If { negate: false }));
    add("unless", Arc::new(If { negate: true }));
    add("case", Arc::new(Case));
    add("ifchanged", Arc::new(IfChanged));
    add("for", Arc::new(For));
    add(
        "break",
        Arc::new(LoopControl {
            interrupt: Interrupt::Break,
        }),
    );
    add(
        "continue",
        Arc::new(LoopControl {
            interrupt: Interrupt::Continue,
        }),
    );
    add("cycle", Arc::new(Cycle));
    add("tablerow", Arc::new(TableRow));
    add("comment", Arc::new(Comment));
    add("#", Arc::new(InlineComment));
    add("echo", Arc::new(Echo));
    add("liquid", Arc::new(LiquidTag));
    add("include", Arc::new(Include));
    add("render", Arc::new(RenderTag));
    add("embed", Arc::new(Embed));
    add("block", Arc::new(Block));
    rv
}

pub(crate) fn get_builtin_filters() -> BTreeMap<String, BoxedFilter> {
    #[allow(unused_mut)]
    let mut rv = BTreeMap::new();
    #[cfg(feature = "builtins")]
    {
        use crate::filters;

        let mut add = |name: &str, filter: BoxedFilter| {
            rv.insert(name.to_string(), filter);
        };
        add("abs", BoxedFilter::new(filters::abs));
        add("append", BoxedFilter::new(filters::append));
        add("at_least", BoxedFilter::new(filters::at_least));
        add("at_most", BoxedFilter::new(filters::at_most));
        add("capitalize", BoxedFilter::new(filters::capitalize));
        add("ceil", BoxedFilter::new(filters::ceil));
        add("compact", BoxedFilter::new(filters::compact));
        add("concat", BoxedFilter::new(filters::concat));
        add("default", BoxedFilter::new(filters::default));
        add("divided_by", BoxedFilter::new(filters::divided_by));
        add("downcase", BoxedFilter::new(filters::downcase));
        add("escape", BoxedFilter::new(filters::escape));
        add("h", BoxedFilter::new(filters::escape));
        add("escape_once", BoxedFilter::new(filters::escape_once));
        add("first", BoxedFilter::new(filters::first));
        add("floor", BoxedFilter::new(filters::floor));
        add("join", BoxedFilter::new(filters::join));
        add("last", BoxedFilter::new(filters::last));
        add("lstrip", BoxedFilter::new(filters::lstrip));
        add("map", BoxedFilter::new(filters::map));
        add("minus", BoxedFilter::new(filters::minus));
        add("modulo", BoxedFilter::new(filters::modulo));
        add("newline_to_br", BoxedFilter::new(filters::newline_to_br));
        add("plus", BoxedFilter::new(filters::plus));
        add("prepend", BoxedFilter::new(filters::prepend));
        add("remove", BoxedFilter::new(filters::remove));
        add("remove_first", BoxedFilter::new(filters::remove_first));
        add("remove_last", BoxedFilter::new(filters::remove_last));
        add("replace", BoxedFilter::new(filters::replace));
        add("replace_first", BoxedFilter::new(filters::replace_first));
        add("replace_last", BoxedFilter::new(filters::replace_last));
        add("reverse", BoxedFilter::new(filters::reverse));
        add("round", BoxedFilter::new(filters::round));
        add("rstrip", BoxedFilter::new(filters::rstrip));
        add("size", BoxedFilter::new(filters::size));
        add("slice", BoxedFilter::new(filters::slice));
        add("sort", BoxedFilter::new(filters::sort));
        add("sort_natural", BoxedFilter::new(filters::sort_natural));
        add("split", BoxedFilter::new(filters::split));
        add("strip", BoxedFilter::new(filters::strip));
        add("strip_html", BoxedFilter::new(filters::strip_html));
        add("strip_newlines", BoxedFilter::new(filters::strip_newlines));
        add("sum", BoxedFilter::new(filters::sum));
        add("times", BoxedFilter::new(filters::times));
        add("truncate", BoxedFilter::new(filters::truncate));
        add("truncatewords", BoxedFilter::new(filters::truncatewords));
        add("uniq", BoxedFilter::new(filters::uniq));
        add("upcase", BoxedFilter::new(filters::upcase));
        add("where", BoxedFilter::new(filters::r#where));
        #[cfg(feature = "urlencode")]
        {
            add("url_encode", BoxedFilter::new(filters::url_encode));
            add("url_decode", BoxedFilter::new(filters::url_decode));
        }
        #[cfg(feature = "json")]
        {
            add("json", BoxedFilter::new(filters::json));
        }
    }
    rv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tags() {
        let tags = get_builtin_tags();
        for name in ["if", "unless", "for", "break", "#", "embed", "block"] {
            assert!(tags.contains_key(name), "missing tag {name}");
        }
        assert!(tags["for"].is_block());
        assert!(!tags["break"].is_block());
        assert!(!tags.contains_key("raw"));
    }

    #[test]
    #[cfg(feature = "builtins")]
    fn test_builtin_filters() {
        let filters = get_builtin_filters();
        assert!(filters.contains_key("h"));
        assert!(filters.contains_key("where"));
        assert!(!filters.contains_key("date"));
    }
}
