use backlog_forge::models::*;
use backlog_forge::template::expand::{
    exclude_features, expand, ExclusionPolicy, InstanceOverrides,
};
use backlog_forge::template::parse_template;
use backlog_forge::template::validate::{has_errors, validate, Severity};
use speculate2::speculate;

/// A template exercising every construct: an optional feature, a
/// parameterized feature, and parameterized stories with instance keys.
const PLATFORM_TEMPLATE: &str = r#"
template:
  name: data-platform
  version: 2
epics:
  - title: Acme Data Platform
    description: Delivery backlog for the data platform
    features:
      - title: Firm Foundation
        description: Shared infrastructure setup
        optional: true
        stories:
          - title: Provision environments
            description: Create dev and prod workspaces
            acceptance_criteria: |
              • Dev workspace exists
              • Prod workspace exists
            story_points: 3
            tasks:
              - title: Create workspaces
                description: Provision both workspaces
                estimate: 8
      - title: Data Source Integration - {{name}}
        description: Ingest data from {{name}}
        parameterized: true
        default_instances: [SAP]
        stories:
          - title: Connect to {{name}}
            description: Land raw {{name}} data
            acceptance_criteria: |
              • Connection to {{name}} verified
            story_points: 5
            tasks:
              - title: Configure {{name}} connection
                description: Set up credentials for {{name}}
                estimate: 8
      - title: Data Modeling Layer
        description: Dimensional model of the platform
        stories:
          - title: Dimension - {{name}}
            description: Model the {{name}} dimension
            acceptance_criteria: |
              • {{name}} dimension loads
            parameterized: true
            instance_key: Dimension
            default_instances: [Calendar, Customer]
            story_points: 3
            tasks:
              - title: Build {{name}} dimension table
                description: Create and load the table
                estimate: 6
          - title: Fact - {{name}}
            description: Model the {{name}} fact
            acceptance_criteria: |
              • {{name}} fact loads
            parameterized: true
            instance_key: Fact
            default_instances: [Sales]
            story_points: 5
            tasks:
              - title: Build {{name}} fact table
                description: Create and load the table
                estimate: 8
"#;

fn parse(yaml: &str) -> TemplateDoc {
    parse_template(yaml).expect("template should parse")
}

fn expand_default(yaml: &str) -> Backlog {
    expand(&parse(yaml), &InstanceOverrides::new()).expect("expansion should succeed")
}

fn feature_titles(backlog: &Backlog) -> Vec<&str> {
    backlog.epics[0]
        .features
        .iter()
        .map(|f| f.title.as_str())
        .collect()
}

fn story_titles(feature: &Feature) -> Vec<&str> {
    feature.stories.iter().map(|s| s.title.as_str()).collect()
}

speculate! {
    describe "template loading" {
        it "parses a nested document" {
            let doc = parse(PLATFORM_TEMPLATE);
            assert_eq!(doc.epics.len(), 1);
            assert_eq!(doc.epics[0].title, "Acme Data Platform");
            assert_eq!(doc.epics[0].features.len(), 3);
            assert_eq!(doc.epics[0].features[2].stories.len(), 2);
        }

        it "rejects a document with no epics" {
            let result = parse_template("epics: []");
            assert!(result.is_err());
        }

        it "rejects a document that is not valid YAML" {
            let result = parse_template("epics: [title: {");
            assert!(result.is_err());
        }

        it "defaults expansion markers when absent" {
            let doc = parse(PLATFORM_TEMPLATE);
            let foundation = &doc.epics[0].features[0];
            assert!(foundation.optional);
            assert!(!foundation.parameterized);
            assert!(foundation.default_instances.is_empty());

            let modeling = &doc.epics[0].features[2];
            assert!(!modeling.optional);
            assert!(modeling.stories[0].parameterized);
        }
    }

    describe "feature exclusion" {
        before {
            let mut doc = parse(PLATFORM_TEMPLATE);
        }

        it "removes features matching a keyword case-insensitively" {
            exclude_features(&mut doc, &["firm foundation".to_string()], ExclusionPolicy::AnyFeature);
            assert_eq!(doc.epics[0].features.len(), 2);
            assert_eq!(doc.epics[0].features[0].title, "Data Source Integration - {{name}}");
        }

        it "matches on title substrings" {
            exclude_features(&mut doc, &["modeling".to_string()], ExclusionPolicy::AnyFeature);
            assert_eq!(doc.epics[0].features.len(), 2);
        }

        it "removes a parameterized feature before it expands" {
            exclude_features(&mut doc, &["data source".to_string()], ExclusionPolicy::AnyFeature);
            let backlog = expand(&doc, &InstanceOverrides::new()).unwrap();
            assert_eq!(feature_titles(&backlog), vec!["Firm Foundation", "Data Modeling Layer"]);
        }

        it "only removes optional features under the optional-only policy" {
            let keywords = vec!["foundation".to_string(), "modeling".to_string()];
            exclude_features(&mut doc, &keywords, ExclusionPolicy::OptionalOnly);
            let titles: Vec<&str> = doc.epics[0].features.iter().map(|f| f.title.as_str()).collect();
            assert_eq!(titles, vec!["Data Source Integration - {{name}}", "Data Modeling Layer"]);
        }

        it "ignores empty keywords" {
            exclude_features(&mut doc, &["".to_string()], ExclusionPolicy::AnyFeature);
            assert_eq!(doc.epics[0].features.len(), 3);
        }
    }

    describe "expansion" {
        describe "parameterized features" {
            it "stamps one copy per default instance" {
                let backlog = expand_default(PLATFORM_TEMPLATE);
                assert_eq!(
                    feature_titles(&backlog),
                    vec!["Firm Foundation", "Data Source Integration - SAP", "Data Modeling Layer"]
                );
            }

            it "substitutes placeholders through the whole subtree" {
                let backlog = expand_default(PLATFORM_TEMPLATE);
                let sap = &backlog.epics[0].features[1];
                assert_eq!(sap.description.as_deref(), Some("Ingest data from SAP"));

                let story = &sap.stories[0];
                assert_eq!(story.title, "Connect to SAP");
                assert_eq!(story.description.as_deref(), Some("Land raw SAP data"));
                assert!(story.acceptance_criteria.as_deref().unwrap().contains("Connection to SAP verified"));
                assert_eq!(story.tasks[0].title, "Configure SAP connection");
                assert_eq!(story.tasks[0].description.as_deref(), Some("Set up credentials for SAP"));
            }

            it "keeps instances in list order ahead of later features" {
                let mut overrides = InstanceOverrides::new();
                overrides.insert("Data Source Integration", vec!["SAP".to_string(), "Salesforce".to_string()]);
                let backlog = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
                assert_eq!(
                    feature_titles(&backlog),
                    vec![
                        "Firm Foundation",
                        "Data Source Integration - SAP",
                        "Data Source Integration - Salesforce",
                        "Data Modeling Layer",
                    ]
                );
            }

            it "accepts the spaced placeholder spelling" {
                let yaml = r#"
epics:
  - title: Spaced
    description: Spaced placeholder
    features:
      - title: Semantic Model - {{ name }}
        description: Model for {{ name }}
        parameterized: true
        default_instances: [Core]
        stories: []
"#;
                let backlog = expand_default(yaml);
                assert_eq!(feature_titles(&backlog), vec!["Semantic Model - Core"]);
                assert_eq!(
                    backlog.epics[0].features[0].description.as_deref(),
                    Some("Model for Core")
                );
            }
        }

        describe "parameterized stories" {
            it "expands stories in place within the feature" {
                let backlog = expand_default(PLATFORM_TEMPLATE);
                let modeling = &backlog.epics[0].features[2];
                assert_eq!(
                    story_titles(modeling),
                    vec!["Dimension - Calendar", "Dimension - Customer", "Fact - Sales"]
                );
            }

            it "substitutes task text per instance" {
                let backlog = expand_default(PLATFORM_TEMPLATE);
                let modeling = &backlog.epics[0].features[2];
                assert_eq!(modeling.stories[0].tasks[0].title, "Build Calendar dimension table");
                assert_eq!(modeling.stories[1].tasks[0].title, "Build Customer dimension table");
            }

            it "carries points and estimates through unchanged" {
                let backlog = expand_default(PLATFORM_TEMPLATE);
                let modeling = &backlog.epics[0].features[2];
                assert_eq!(modeling.stories[0].story_points, Some(3.0));
                assert_eq!(modeling.stories[2].story_points, Some(5.0));
                assert_eq!(modeling.stories[2].tasks[0].estimate, Some(8.0));
            }
        }

        describe "instance overrides" {
            it "replaces default instances for a feature key" {
                let mut overrides = InstanceOverrides::new();
                overrides.insert("data source", vec!["Salesforce".to_string()]);
                let backlog = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
                assert_eq!(
                    feature_titles(&backlog),
                    vec!["Firm Foundation", "Data Source Integration - Salesforce", "Data Modeling Layer"]
                );
            }

            it "targets one story through its instance key" {
                let mut overrides = InstanceOverrides::new();
                overrides.insert("Data Modeling Layer.Dimension", vec!["Product".to_string()]);
                let backlog = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
                let modeling = &backlog.epics[0].features[2];
                assert_eq!(story_titles(modeling), vec!["Dimension - Product", "Fact - Sales"]);
            }

            it "leaves other features' stories alone" {
                let mut overrides = InstanceOverrides::new();
                overrides.insert("Data Modeling Layer.Fact", vec!["Orders".to_string(), "Returns".to_string()]);
                let backlog = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
                let sap = &backlog.epics[0].features[1];
                assert_eq!(story_titles(sap), vec!["Connect to SAP"]);
                let modeling = &backlog.epics[0].features[2];
                assert_eq!(
                    story_titles(modeling),
                    vec!["Dimension - Calendar", "Dimension - Customer", "Fact - Orders", "Fact - Returns"]
                );
            }

            it "expands a feature to nothing on an empty instance list" {
                let mut overrides = InstanceOverrides::new();
                overrides.insert("Data Source Integration", vec![]);
                let backlog = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
                assert_eq!(feature_titles(&backlog), vec!["Firm Foundation", "Data Modeling Layer"]);
            }

            it "expands a story to nothing on an empty instance list" {
                let mut overrides = InstanceOverrides::new();
                overrides.insert("modeling.fact", vec![]);
                let backlog = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
                let modeling = &backlog.epics[0].features[2];
                assert_eq!(story_titles(modeling), vec!["Dimension - Calendar", "Dimension - Customer"]);
            }
        }

        describe "unresolved placeholders" {
            it "errors when a non-parameterized feature keeps a placeholder" {
                let yaml = r#"
epics:
  - title: Broken
    description: A placeholder without parameterized
    features:
      - title: Integration - {{name}}
        description: Never expanded
        stories: []
"#;
                let err = expand(&parse(yaml), &InstanceOverrides::new()).unwrap_err();
                assert!(err.to_string().contains("feature 'Integration - {{name}}'"), "got: {}", err);
            }

            it "errors when a task under a concrete story keeps a placeholder" {
                let yaml = r#"
epics:
  - title: Broken
    description: Placeholder hidden in a task
    features:
      - title: Plain Feature
        description: Concrete
        stories:
          - title: Plain story
            description: Concrete
            acceptance_criteria: Done
            story_points: 3
            tasks:
              - title: Configure {{name}} endpoint
                description: Concrete
                estimate: 4
"#;
                let err = expand(&parse(yaml), &InstanceOverrides::new()).unwrap_err();
                assert!(err.to_string().contains("task 'Configure {{name}} endpoint'"), "got: {}", err);
            }
        }

        describe "idempotency" {
            it "re-expanding a serialized backlog changes nothing" {
                let backlog = expand_default(PLATFORM_TEMPLATE);
                let yaml = serde_yaml::to_string(&backlog).unwrap();
                let again = expand_default(&yaml);
                assert_eq!(again, backlog);
            }
        }
    }

    describe "override parsing" {
        it "parses KEY=a,b arguments" {
            let args = vec!["Data Source Integration=SAP,Salesforce".to_string()];
            let overrides = InstanceOverrides::from_args(&args).unwrap();
            let instances = overrides.for_feature("Data Source Integration - {{name}}").unwrap();
            assert_eq!(instances, ["SAP".to_string(), "Salesforce".to_string()]);
        }

        it "parses dotted keys into story rules" {
            let args = vec!["Data Modeling Layer.Dimension=Product".to_string()];
            let overrides = InstanceOverrides::from_args(&args).unwrap();
            assert!(overrides.for_feature("Data Modeling Layer").is_none());
            let instances = overrides.for_story("Data Modeling Layer", "Dimension").unwrap();
            assert_eq!(instances, ["Product".to_string()]);
        }

        it "trims whitespace and drops empty names" {
            let args = vec!["sources= SAP , ,Salesforce ".to_string()];
            let overrides = InstanceOverrides::from_args(&args).unwrap();
            let instances = overrides.for_feature("Sources").unwrap();
            assert_eq!(instances, ["SAP".to_string(), "Salesforce".to_string()]);
        }

        it "rejects arguments without an equals sign" {
            let args = vec!["just-a-key".to_string()];
            let err = InstanceOverrides::from_args(&args).unwrap_err();
            assert!(err.to_string().contains("just-a-key"));
        }

        it "rejects arguments with an empty key" {
            let args = vec!["=SAP".to_string()];
            assert!(InstanceOverrides::from_args(&args).is_err());
        }
    }

    describe "validation" {
        it "accepts a fully populated backlog" {
            let backlog = expand_default(PLATFORM_TEMPLATE);
            let issues = validate(&backlog);
            assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
        }

        it "reports blank titles" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: ""
        description: Valid
        stories: []
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.iter().any(|i| i.severity == Severity::Error && i.message == "missing title"));
        }

        it "reports missing descriptions at every level" {
            let yaml = r#"
epics:
  - title: Epic
    features:
      - title: Feature
        stories:
          - title: Story
            acceptance_criteria: Done
            story_points: 3
            tasks:
              - title: Task
                estimate: 4
"#;
            let issues = validate(&expand_default(yaml));
            let missing: Vec<&str> = issues
                .iter()
                .filter(|i| i.message == "missing description")
                .map(|i| i.location.as_str())
                .collect();
            assert_eq!(missing, vec!["Epic 'Epic'", "Feature 'Feature'", "Story 'Story'", "Task 'Task'"]);
        }

        it "requires acceptance criteria on stories" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Feature
        description: Valid
        stories:
          - title: Story
            description: Valid
            story_points: 3
            tasks:
              - title: Task
                description: Valid
                estimate: 4
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.iter().any(|i| {
                i.severity == Severity::Error
                    && i.location == "Story 'Story'"
                    && i.message == "missing acceptance_criteria"
            }));
        }

        it "requires positive story points" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Feature
        description: Valid
        stories:
          - title: Story
            description: Valid
            acceptance_criteria: Done
            story_points: 0
            tasks:
              - title: Task
                description: Valid
                estimate: 4
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.iter().any(|i| {
                i.severity == Severity::Error && i.message == "story_points must be positive"
            }));
        }

        it "requires positive task estimates" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Feature
        description: Valid
        stories:
          - title: Story
            description: Valid
            acceptance_criteria: Done
            story_points: 3
            tasks:
              - title: Task
                description: Valid
                estimate: -2
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.iter().any(|i| {
                i.severity == Severity::Error
                    && i.location == "Task 'Task'"
                    && i.message == "estimate must be positive"
            }));
        }

        it "reports duplicate sibling titles" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Feature
        description: Valid
        stories:
          - title: Same Story
            description: Valid
            acceptance_criteria: Done
            story_points: 3
            tasks:
              - title: Task
                description: Valid
                estimate: 4
          - title: Same Story
            description: Valid
            acceptance_criteria: Done
            story_points: 5
            tasks:
              - title: Task
                description: Valid
                estimate: 4
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.iter().any(|i| {
                i.severity == Severity::Error
                    && i.location == "Feature 'Feature'"
                    && i.message == "duplicate story title 'Same Story'"
            }));
        }

        it "allows the same title under different parents" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Feature A
        description: Valid
        stories:
          - title: Common Story
            description: Valid
            acceptance_criteria: Done
            story_points: 3
            tasks:
              - title: Task
                description: Valid
                estimate: 4
      - title: Feature B
        description: Valid
        stories:
          - title: Common Story
            description: Valid
            acceptance_criteria: Done
            story_points: 3
            tasks:
              - title: Task
                description: Valid
                estimate: 4
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
        }

        it "warns on story points off the scale" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Feature
        description: Valid
        stories:
          - title: Story
            description: Valid
            acceptance_criteria: Done
            story_points: 4
            tasks:
              - title: Task
                description: Valid
                estimate: 4
"#;
            let issues = validate(&expand_default(yaml));
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].severity, Severity::Warning);
            assert!(issues[0].message.contains("not in the 1/2/3/5/8/13 scale"));
            assert!(!has_errors(&issues));
        }

        it "warns on features without stories and stories without tasks" {
            let yaml = r#"
epics:
  - title: Epic
    description: Valid
    features:
      - title: Empty Feature
        description: Valid
        stories: []
      - title: Feature
        description: Valid
        stories:
          - title: Story
            description: Valid
            acceptance_criteria: Done
            story_points: 3
            tasks: []
"#;
            let issues = validate(&expand_default(yaml));
            assert!(issues.iter().any(|i| {
                i.severity == Severity::Warning && i.message == "feature has no stories"
            }));
            assert!(issues.iter().any(|i| {
                i.severity == Severity::Warning && i.message == "story has no tasks"
            }));
            assert!(!has_errors(&issues));
        }
    }

    describe "counts and totals" {
        before {
            let backlog = expand_default(PLATFORM_TEMPLATE);
        }

        it "counts every level of the hierarchy" {
            let counts = backlog.counts();
            assert_eq!(counts.epics, 1);
            assert_eq!(counts.features, 3);
            assert_eq!(counts.stories, 5);
            assert_eq!(counts.tasks, 5);
            assert_eq!(counts.total(), 14);
        }

        it "sums story points and estimate hours" {
            assert_eq!(backlog.total_story_points(), 19.0);
            assert_eq!(backlog.total_estimate_hours(), 36.0);
        }

        it "grows with the instance list" {
            let mut overrides = InstanceOverrides::new();
            overrides.insert("Data Source Integration", vec!["SAP".to_string(), "Salesforce".to_string(), "Workday".to_string()]);
            let expanded = expand(&parse(PLATFORM_TEMPLATE), &overrides).unwrap();
            assert_eq!(expanded.counts().features, backlog.counts().features + 2);
            assert_eq!(expanded.counts().stories, backlog.counts().stories + 2);
        }
    }

    describe "platform scenario" {
        it "excludes the foundation and expands both data sources" {
            let mut doc = parse(PLATFORM_TEMPLATE);
            exclude_features(&mut doc, &["Firm Foundation".to_string()], ExclusionPolicy::AnyFeature);

            let mut overrides = InstanceOverrides::new();
            overrides.insert("Data Source Integration", vec!["SAP".to_string(), "Salesforce".to_string()]);

            let backlog = expand(&doc, &overrides).unwrap();
            assert_eq!(
                feature_titles(&backlog),
                vec![
                    "Data Source Integration - SAP",
                    "Data Source Integration - Salesforce",
                    "Data Modeling Layer",
                ]
            );
            assert!(validate(&backlog).is_empty());
            assert_eq!(backlog.total_story_points(), 21.0);
        }
    }
}
