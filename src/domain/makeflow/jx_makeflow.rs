use std::fs;
use std::path::Path;

use crate::api::makeflow_dto::{CategoryDto, JxDocumentDto, ResourcesDto, RuleDto};
use crate::domain::resources::ResourceCategory;
use crate::error::{Error, Result};

/// Environment variable exported to every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentBinding {
    pub name: String,
    pub value: String,
}

impl EnvironmentBinding {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        EnvironmentBinding { name: name.into(), value: value.into() }
    }
}

/// One unit of work for the external scheduler: a command, the files it needs and the files it makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub command: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub category: Option<ResourceCategory>,
}

impl Rule {
    pub fn new(command: impl Into<String>, inputs: Vec<String>, outputs: Vec<String>, category: Option<ResourceCategory>) -> Self {
        Rule { command: command.into(), inputs, outputs, category }
    }

    fn to_dto(&self) -> RuleDto {
        RuleDto {
            command: self.command.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            category: self.category.as_ref().map(|category| category.name.to_string()),
        }
    }
}

/// Collects categories, environment bindings and rules and renders the task-list document.
#[derive(Debug, Clone, Default)]
pub struct JxMakeflow {
    environment: Vec<EnvironmentBinding>,
    categories: Vec<ResourceCategory>,
    rules: Vec<Rule>,
}

impl JxMakeflow {
    pub fn new() -> Self {
        JxMakeflow::default()
    }

    pub fn add_environment(&mut self, binding: EnvironmentBinding) {
        self.environment.retain(|existing| existing.name != binding.name);
        self.environment.push(binding);
    }

    /// Registers a category. Re-registering an identical category is a no-op; the same name with
    /// different resources is rejected.
    pub fn add_category(&mut self, category: Option<&ResourceCategory>) -> Result<()> {
        let Some(category) = category else {
            return Ok(());
        };

        match self.categories.iter().find(|existing| existing.name == category.name) {
            Some(existing) if existing.resources == category.resources => Ok(()),
            Some(existing) => Err(Error::CompileIntegrity(format!(
                "category '{}' declared with {:?} and {:?}",
                category.name, existing.resources, category.resources
            ))),
            None => {
                self.categories.push(category.clone());
                Ok(())
            }
        }
    }

    /// Adds a rule and declares its category.
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        self.add_category(rule.category.as_ref())?;
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn categories(&self) -> &[ResourceCategory] {
        &self.categories
    }

    /// Builds the document, checking that every rule's category is declared.
    pub fn to_dto(&self) -> Result<JxDocumentDto> {
        let mut document = JxDocumentDto::default();

        for category in &self.categories {
            let resources = ResourcesDto { cores: category.resources.cores, memory: category.resources.memory_mb };
            document.categories.insert(category.name.to_string(), CategoryDto { resources });
        }

        for binding in &self.environment {
            document.environment.insert(binding.name.clone(), binding.value.clone());
        }

        for rule in &self.rules {
            let dto = rule.to_dto();
            if let Some(category) = &dto.category {
                if !document.categories.contains_key(category) {
                    return Err(Error::CompileIntegrity(format!("rule references undeclared category '{category}'")));
                }
            }
            document.rules.push(dto);
        }

        Ok(document)
    }

    /// Pretty JSON text of the document; empty when there are no rules.
    pub fn get_str(&self) -> Result<String> {
        if self.rules.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string_pretty(&self.to_dto()?)?)
    }

    pub fn write(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(out_file, self.get_str()?)?;
        log::info!("Task list with {} rules written to '{}'", self.rules.len(), out_file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, category: Option<ResourceCategory>) -> Rule {
        Rule::new(format!("run {name}"), vec![format!("/params/{name}")], vec![format!("/store/{name}.out")], category)
    }

    #[test]
    fn test_empty_makeflow_renders_nothing() {
        assert_eq!(JxMakeflow::new().get_str().unwrap(), "");
    }

    #[test]
    fn test_categories_are_declared_once() {
        let mut makeflow = JxMakeflow::new();
        let category = ResourceCategory::new("small", 1, 512);
        makeflow.add_rule(rule("a", Some(category.clone()))).unwrap();
        makeflow.add_rule(rule("b", Some(category))).unwrap();
        makeflow.add_rule(rule("c", None)).unwrap();

        let document = makeflow.to_dto().unwrap();
        assert_eq!(document.categories.len(), 1);
        assert_eq!(document.categories["small"].resources, ResourcesDto { cores: 1, memory: 512 });
        assert_eq!(document.rules.len(), 3);
        assert_eq!(document.rules[0].category.as_deref(), Some("small"));
        assert_eq!(document.rules[2].category, None);
    }

    #[test]
    fn test_conflicting_category_is_rejected() {
        let mut makeflow = JxMakeflow::new();
        makeflow.add_rule(rule("a", Some(ResourceCategory::new("big", 8, 4096)))).unwrap();

        let result = makeflow.add_rule(rule("b", Some(ResourceCategory::new("big", 4, 4096))));
        assert!(matches!(result, Err(Error::CompileIntegrity(_))));
    }

    #[test]
    fn test_document_json_shape() {
        let mut makeflow = JxMakeflow::new();
        makeflow.add_environment(EnvironmentBinding::new("OMP_NUM_THREADS", "1"));
        makeflow.add_rule(rule("a", Some(ResourceCategory::new("a", 2, 2048)))).unwrap();

        let json: serde_json::Value = serde_json::from_str(&makeflow.get_str().unwrap()).unwrap();
        assert_eq!(json["categories"]["a"]["resources"]["cores"], 2);
        assert_eq!(json["categories"]["a"]["resources"]["memory"], 2048);
        assert_eq!(json["environment"]["OMP_NUM_THREADS"], "1");
        assert_eq!(json["rules"][0]["command"], "run a");
        assert_eq!(json["rules"][0]["inputs"][0], "/params/a");
        assert_eq!(json["rules"][0]["outputs"][0], "/store/a.out");
        assert_eq!(json["rules"][0]["category"], "a");
    }
}
