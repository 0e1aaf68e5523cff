//! Built-in default skills embedded at compile time.
//!
//! Default skill content is inlined in the binary so the executable is
//! fully self-contained.  On startup the embedded content is seeded into
//! the configured skills directory; existing skill directories are never
//! overwritten, so user edits survive upgrades.

use std::path::Path;

use tracing::{debug, info};

use super::{parse_skill_document, SkillDefinition};
use crate::error::SkillError;

pub struct EmbeddedSkill {
    pub name: &'static str,
    pub skill_md: &'static str,
}

pub static BUILTIN_SKILLS: &[EmbeddedSkill] = &[
    EmbeddedSkill {
        name: "skills-guide",
        skill_md: include_str!("default_skills/skills-guide.md"),
    },
    EmbeddedSkill {
        name: "skill-authoring",
        skill_md: include_str!("default_skills/skill-authoring.md"),
    },
];

/// Seed any missing default skills into `skills_dir`.
pub fn seed_defaults(skills_dir: &Path) -> Result<(), SkillError> {
    for skill in BUILTIN_SKILLS {
        let skill_dir = skills_dir.join(skill.name);
        let skill_md_path = skill_dir.join("SKILL.md");

        if skill_md_path.exists() {
            debug!(skill = skill.name, "built-in skill already present; skipping");
            continue;
        }

        std::fs::create_dir_all(&skill_dir)?;
        std::fs::write(&skill_md_path, skill.skill_md)?;
        info!(skill = skill.name, path = %skill_md_path.display(), "seeded built-in skill");
    }
    Ok(())
}

/// Parse the embedded skills without touching disk.  Used when no skills
/// directory is configured.
pub fn builtin_definitions() -> Vec<SkillDefinition> {
    BUILTIN_SKILLS
        .iter()
        .filter_map(|s| parse_skill_document(s.skill_md).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_skills_parse() {
        for skill in BUILTIN_SKILLS {
            let def = parse_skill_document(skill.skill_md)
                .unwrap_or_else(|e| panic!("{} failed to parse: {e}", skill.name));
            assert_eq!(def.slug, skill.name);
        }
        assert_eq!(builtin_definitions().len(), BUILTIN_SKILLS.len());
    }

    #[test]
    fn seeding_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tmp.path().join("skills-guide");
        std::fs::create_dir_all(&custom).unwrap();
        std::fs::write(custom.join("SKILL.md"), "customised").unwrap();

        seed_defaults(tmp.path()).unwrap();

        let kept = std::fs::read_to_string(custom.join("SKILL.md")).unwrap();
        assert_eq!(kept, "customised");
        assert!(tmp.path().join("skill-authoring/SKILL.md").is_file());
    }
}
