//! 页面准入判断
//!
//! 决定页面能否进入队列，以及受访问组限制的配置是否对当前访问上下文开放。
//! 这里的函数都是纯函数，跳过决定从不产生错误。

use std::collections::HashSet;

use crawler_core::{
    config::CrawlerSettings,
    models::{
        split_list, PageRow, SkipReason, DOKTYPE_LINK, DOKTYPE_NON_CRAWLABLE_FROM,
        DOKTYPE_SHORTCUT, DOKTYPE_SPACER,
    },
};

/// 判断页面是否需要跳过，规则按顺序匹配，命中第一条即返回
pub fn should_skip(page: &PageRow, settings: &CrawlerSettings) -> Option<SkipReason> {
    if is_disallowed_doktype(page.doktype) {
        return Some(SkipReason::DoktypeNotAllowed);
    }

    if let Some((label, _)) = settings
        .exclude_doktype
        .iter()
        .find(|(_, doktype)| **doktype == page.doktype)
    {
        return Some(SkipReason::DoktypeExcluded {
            label: label.clone(),
        });
    }

    if page.hidden && !settings.crawl_hidden_pages {
        return Some(SkipReason::Hidden);
    }

    None
}

fn is_disallowed_doktype(doktype: i32) -> bool {
    matches!(doktype, DOKTYPE_LINK | DOKTYPE_SHORTCUT | DOKTYPE_SPACER)
        || doktype >= DOKTYPE_NON_CRAWLABLE_FROM
}

/// 访问组判断
///
/// `access_list` 为空表示不限制；否则两个列表有交集时允许访问。
pub fn has_group_access(group_list: &str, access_list: &str) -> bool {
    let granted = split_list(access_list);
    if granted.is_empty() {
        return true;
    }

    let required: HashSet<String> = split_list(group_list).into_iter().collect();
    granted.iter().any(|group| required.contains(group))
}

/// 处理指令过滤
///
/// 未请求任何指令时放行；否则至少一个传入指令与允许列表完全一致（区分大小写）。
pub fn pi_filter(allowed_instructions: &str, incoming: &[String]) -> bool {
    if incoming.is_empty() {
        return true;
    }

    let allowed = split_list(allowed_instructions);
    incoming
        .iter()
        .any(|instruction| allowed.iter().any(|a| a == instruction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawler_core::models::{DOKTYPE_RECYCLER, DOKTYPE_SYSFOLDER};

    fn instructions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standard_page_is_eligible() {
        let settings = CrawlerSettings::default();
        assert_eq!(should_skip(&PageRow::new(1, 1), &settings), None);
    }

    #[test]
    fn test_disallowed_doktypes() {
        let settings = CrawlerSettings::default();
        for doktype in [
            DOKTYPE_LINK,
            DOKTYPE_SHORTCUT,
            DOKTYPE_SPACER,
            DOKTYPE_SYSFOLDER,
            DOKTYPE_RECYCLER,
            200,
        ] {
            assert_eq!(
                should_skip(&PageRow::new(1, doktype), &settings),
                Some(SkipReason::DoktypeNotAllowed),
                "doktype {doktype}"
            );
        }
    }

    #[test]
    fn test_hidden_page() {
        let mut settings = CrawlerSettings::default();
        let page = PageRow::new(1, 1).hidden(true);
        assert_eq!(should_skip(&page, &settings), Some(SkipReason::Hidden));
        assert_eq!(
            should_skip(&page, &settings).map(|r| r.to_string()),
            Some("page is hidden".to_string())
        );

        settings.crawl_hidden_pages = true;
        assert_eq!(should_skip(&page, &settings), None);
    }

    #[test]
    fn test_custom_exclusion_names_label() {
        let mut settings = CrawlerSettings::default();
        settings.exclude_doktype.insert("custom".to_string(), 155);

        let reason = should_skip(&PageRow::new(1, 155), &settings);
        assert_eq!(
            reason.map(|r| r.to_string()),
            Some("Doktype was excluded by \"custom\"".to_string())
        );
    }

    #[test]
    fn test_rules_are_ordered() {
        let mut settings = CrawlerSettings::default();
        settings.exclude_doktype.insert("shortcuts".to_string(), 4);

        // 固定的禁止类型优先于排除列表，排除列表优先于隐藏
        assert_eq!(
            should_skip(&PageRow::new(1, DOKTYPE_SHORTCUT), &settings),
            Some(SkipReason::DoktypeNotAllowed)
        );

        settings.exclude_doktype.insert("news".to_string(), 7);
        assert_eq!(
            should_skip(&PageRow::new(1, 7).hidden(true), &settings),
            Some(SkipReason::DoktypeExcluded {
                label: "news".to_string()
            })
        );
    }

    #[test]
    fn test_pi_filter() {
        assert!(pi_filter("a,b", &[]));
        assert!(pi_filter("a,b", &instructions(&["a"])));
        assert!(!pi_filter("a,b", &instructions(&["A"])));
        assert!(pi_filter("a,b", &instructions(&["a", "a"])));
        assert!(pi_filter(
            "tx_indexedsearch_reindex, tx_cachewarmup",
            &instructions(&["tx_cachewarmup"])
        ));
        assert!(!pi_filter("", &instructions(&["a"])));
    }

    #[test]
    fn test_group_access() {
        assert!(!has_group_access("1,2,3", "4,5,6"));
        assert!(has_group_access("1,2,3,4", "4,5,6"));
        assert!(has_group_access("1,2,3", ""));
        assert!(has_group_access("", ""));
        assert!(!has_group_access("", "1"));
        assert!(has_group_access(" 1 , 2", "2"));
    }
}
