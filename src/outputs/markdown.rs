//! Markdown renderings of keyword reports and production artifacts.

use std::fmt::{self, Write};

use crate::analysis::KeywordReport;
use crate::models::AnalyzableBlock;
use crate::production::TopicArtifact;
use crate::utils::truncate_text;

/// Longest post body excerpt shown in a report.
const BODY_EXCERPT_CHARS: usize = 300;

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { "-" } else { value }
}

fn write_block(md: &mut String, position: usize, block: &AnalyzableBlock) -> fmt::Result {
    writeln!(md, "### {}\n", block.display_label(position))?;
    if block.posts.is_empty() {
        writeln!(md, "_수집된 글이 없습니다._\n")?;
        return Ok(());
    }
    for (i, post) in block.posts.iter().enumerate() {
        writeln!(md, "{}. [{}]({})", i + 1, or_dash(&post.title), post.canonical_url)?;
        writeln!(md, "    - 태그: {}", or_dash(&post.tags_joined()))?;
        writeln!(md, "    - 본문: {}", or_dash(&truncate_text(&post.body, BODY_EXCERPT_CHARS)))?;
    }
    writeln!(md)
}

fn write_keyword_report(md: &mut String, report: &KeywordReport) -> fmt::Result {
    let s = &report.summary;
    writeln!(md, "# {}\n", report.keyword)?;
    writeln!(md, "- 생성시각: {}", report.created_at)?;
    writeln!(md, "- 모델: {}", report.model.as_deref().unwrap_or("-"))?;
    writeln!(md, "- 수집상태: {}", report.collection_status())?;
    if let Some(err) = &report.collection_error {
        writeln!(md, "- 수집오류: {err}")?;
    }
    writeln!(md, "- 스마트블록: {}", s.flag())?;
    writeln!(md, "- 인기글 제목: {}", or_dash(&s.article_titles_joined()))?;
    writeln!(md, "- 인기주제 제목: {}", or_dash(&s.topic_titles_joined()))?;
    writeln!(md, "- 섹션 순번: {}\n", or_dash(&s.section_ordinals()))?;

    writeln!(md, "## 전체 분석\n")?;
    writeln!(md, "{}\n", report.overall_display())?;

    if !report.topic_analyses.is_empty() {
        writeln!(md, "## 주제별 분석\n")?;
        for analysis in &report.topic_analyses {
            writeln!(md, "### {}\n", analysis.label)?;
            match &analysis.error {
                Some(err) => writeln!(md, "Gemini 분석 실패: {err}\n")?,
                None => writeln!(md, "{}\n", analysis.text)?,
            }
        }
    }

    writeln!(md, "## 상위 글\n")?;
    if report.blocks.is_empty() {
        writeln!(md, "_분석 가능한 블록이 없습니다._")?;
    }
    for (i, block) in report.blocks.iter().enumerate() {
        write_block(md, i, block)?;
    }
    Ok(())
}

fn write_topic_artifact(md: &mut String, a: &TopicArtifact) -> fmt::Result {
    writeln!(md, "# {}\n", a.selected_title.as_deref().unwrap_or(&a.topic_title))?;
    writeln!(md, "- 키워드: {}", a.keyword)?;
    writeln!(md, "- 주제: {} ({}/{})", a.topic_title, a.topic_no, a.topic_count)?;
    writeln!(md, "- 제품: {}", a.product_name)?;
    writeln!(md, "- 작성의도: {}", a.intent)?;
    writeln!(md, "- 생성시각: {}", a.created_at)?;
    if let Some(err) = &a.error {
        writeln!(md, "- 오류: {err}")?;
    }
    writeln!(md)?;

    if let Some(scoring) = &a.title_scoring {
        writeln!(md, "## 제목 후보\n")?;
        writeln!(md, "선정 사유: {}\n", scoring.selection_reason)?;
        writeln!(md, "| 점수 | 제목 | 사유 |")?;
        writeln!(md, "|---:|---|---|")?;
        for s in &scoring.scores {
            writeln!(md, "| {:.0} | {} | {} |", s.score, s.title, or_dash(&s.reason).replace('|', "/"))?;
        }
        writeln!(md)?;
    }

    if let Some(plans) = &a.plans {
        writeln!(md, "## 기획안\n")?;
        for (i, plan) in plans.plans.iter().enumerate() {
            let marker = if i + 1 == plans.selected_plan_index { " (선택)" } else { "" };
            writeln!(md, "### {}. {} [{}]{marker}\n", i + 1, plan.plan_name, or_dash(&plan.pattern))?;
            for item in &plan.outline {
                writeln!(md, "- {item}")?;
            }
            writeln!(md, "\n{}\n", or_dash(&plan.why))?;
        }
    }

    for (heading, text) in [("원고", &a.draft), ("검수", &a.review), ("수정본", &a.rewrite)] {
        if !text.is_empty() {
            writeln!(md, "## {heading}\n\n{text}\n")?;
        }
    }

    writeln!(md, "## 처리 로그\n")?;
    writeln!(md, "| 단계 | 시작 | ms | 상태 |")?;
    writeln!(md, "|---|---|---:|---|")?;
    for entry in &a.process_log.0 {
        writeln!(
            md,
            "| {} | {} | {} | {} |",
            entry.step,
            entry.started_at,
            entry.duration_ms,
            entry.status.as_str()
        )?;
    }
    Ok(())
}

pub fn keyword_report_to_markdown(report: &KeywordReport) -> String {
    let mut md = String::new();
    let _ = write_keyword_report(&mut md, report);
    md
}

pub fn topic_artifact_to_markdown(artifact: &TopicArtifact) -> String {
    let mut md = String::new();
    let _ = write_topic_artifact(&mut md, artifact);
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisStatus, TopicAnalysis};
    use crate::analysis::tests::post;
    use crate::models::{BlockCategory, QuerySummary};
    use crate::production::{ProcessLog, ProcessLogEntry, StepStatus};

    fn report() -> KeywordReport {
        KeywordReport {
            keyword: "캠핑 의자".into(),
            created_at: "2026-01-01 10:00:00".into(),
            model: Some("m".into()),
            summary: QuerySummary {
                has_popular_topic: true,
                topic_titles: vec!["의자 추천".into()],
                topic_ordinals: vec![2],
                ..QuerySummary::default()
            },
            blocks: vec![AnalyzableBlock {
                category: BlockCategory::PopularTopic,
                title: "의자 추천".into(),
                ordinal: 2,
                posts: vec![post("https://m.blog.naver.com/a/111111", "의자 후기")],
            }],
            topic_analyses: vec![TopicAnalysis {
                topic_no: 1,
                label: "주제 1".into(),
                text: String::new(),
                error: Some("quota".into()),
            }],
            overall_status: AnalysisStatus::Ok,
            overall_text: "전략 요약".into(),
            overall_error: None,
            collection_error: None,
        }
    }

    #[test]
    fn test_keyword_report_markdown() {
        let md = keyword_report_to_markdown(&report());
        assert!(md.starts_with("# 캠핑 의자\n"));
        assert!(md.contains("- 스마트블록: 인기주제"));
        assert!(md.contains("## 전체 분석\n\n전략 요약"));
        assert!(md.contains("Gemini 분석 실패: quota"));
        assert!(md.contains("1. [의자 후기](https://m.blog.naver.com/a/111111)"));
        assert!(md.contains("    - 태그: #캠핑"));
    }

    #[test]
    fn test_partial_artifact_markdown() {
        let artifact = TopicArtifact {
            keyword: "k".into(),
            created_at: "t".into(),
            product_name: "p".into(),
            intent: "i".into(),
            topic_no: 1,
            topic_count: 2,
            topic_title: "주제".into(),
            titles: vec![],
            title_scoring: None,
            plans: None,
            selected_title: None,
            draft: String::new(),
            review: String::new(),
            rewrite: String::new(),
            process_log: ProcessLog(vec![ProcessLogEntry {
                step: "TITLE_GEN".into(),
                started_at: "t".into(),
                duration_ms: 12,
                status: StepStatus::Error,
                input_summary: String::new(),
                output: "boom".into(),
            }]),
            error: Some("boom".into()),
        };
        let md = topic_artifact_to_markdown(&artifact);
        assert!(md.starts_with("# 주제\n"));
        assert!(md.contains("- 오류: boom"));
        assert!(!md.contains("## 원고"));
        assert!(md.contains("| TITLE_GEN | t | 12 | ERROR |"));
    }
}
