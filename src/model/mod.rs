//! Model - rarity classifier with provenance and on-disk artifacts
//!
//! [`Predictor`] wraps any [`Classifier`] with the metadata needed to use it
//! safely: the label column it was trained on, the feature schema it expects
//! at inference, the class labels, a display name and a training timestamp.
//! All of it travels in the artifact, so a restored model describes itself
//! and validates its input exactly like the one that was saved.
//!
//! ```text
//! Uninitialized ──train / restore──> Ready ──train / reload──> Ready
//! ```

mod artifact;
mod features;
mod forest;
mod report;
mod tree;

pub use artifact::{ArtifactRecord, ARTIFACT_FORMAT, ARTIFACT_VERSION, DEFAULT_ARTIFACT_PATH};
pub use features::{EncodedLabels, FeatureMatrix};
pub use forest::{ForestParams, RandomForest};
pub use report::TrainingReport;
pub use tree::{Criterion, DecisionTree, MaxFeatures, TreeNode, TreeParams};

use crate::table::Table;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ndarray::ArrayView1;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

/// Display name of the bundled classifier
pub const MODEL_NAME: &str = "Random Forest Classifier";

/// Label column of monster records
pub const DEFAULT_LABEL: &str = "Rarity";

/// Timestamp layout used by [`Predictor::describe`]
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A probabilistic multi-class classifier over dense `f64` features
///
/// Labels are class indices `0..n_classes`.
pub trait Classifier: Debug + Clone + Default + Send + Sync + Serialize + DeserializeOwned {
    /// Fixed display name
    const NAME: &'static str;

    /// Fit on `x` with labels `y`
    ///
    /// # Errors
    ///
    /// Returns `Training` if the data cannot be fitted
    fn fit(&mut self, x: &FeatureMatrix, y: &[usize], n_classes: usize) -> Result<()>;

    /// Class probabilities for one row
    ///
    /// # Errors
    ///
    /// Returns `Prediction` if the classifier is unfitted or the row has the
    /// wrong width
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>>;

    /// Feature count seen during fit
    fn n_features(&self) -> usize;

    /// Class count seen during fit
    fn n_classes(&self) -> usize;

    /// Structural check after deserialization
    ///
    /// # Errors
    ///
    /// Returns `Artifact` describing the inconsistency
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Predicted label with the winning class probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted label
    pub label: String,
    /// Probability of `label`, in `[0, 1]`
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedModel<C> {
    name: String,
    trained_at: DateTime<Utc>,
    label_column: String,
    feature_names: Vec<String>,
    classes: Vec<String>,
    classifier: C,
}

impl<C: Classifier> FittedModel<C> {
    fn check(&self) -> Result<()> {
        if self.name != C::NAME {
            return Err(Error::Artifact(format!(
                "Artifact holds a '{}', expected '{}'",
                self.name,
                C::NAME
            )));
        }
        self.classifier.validate()?;
        if self.feature_names.len() != self.classifier.n_features() {
            return Err(Error::Artifact(format!(
                "Artifact lists {} features but the classifier expects {}",
                self.feature_names.len(),
                self.classifier.n_features()
            )));
        }
        if self.classes.len() != self.classifier.n_classes() {
            return Err(Error::Artifact(format!(
                "Artifact lists {} classes but the classifier has {}",
                self.classes.len(),
                self.classifier.n_classes()
            )));
        }
        Ok(())
    }
}

/// Classifier plus provenance; [`Model`] is the random forest flavour.
///
/// `template` is the unfitted classifier each [`train`](Predictor::train)
/// call starts from, so its hyperparameters (seed included) carry over.
#[derive(Debug, Clone)]
pub struct Predictor<C: Classifier = RandomForest> {
    template: C,
    state: Option<FittedModel<C>>,
}

/// Random forest rarity model
pub type Model = Predictor<RandomForest>;

impl Model {
    /// Create an uninitialized forest model with the given hyperparameters
    ///
    /// Pin [`ForestParams::seed`] to make training reproducible.
    #[must_use]
    pub const fn with_params(params: ForestParams) -> Self {
        Self::with_classifier(RandomForest::new(params))
    }
}

impl<C: Classifier> Default for Predictor<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Classifier> Predictor<C> {
    /// Create an uninitialized model with default hyperparameters
    #[must_use]
    pub fn new() -> Self {
        Self::with_classifier(C::default())
    }

    /// Create an uninitialized model that trains copies of `classifier`
    #[must_use]
    pub const fn with_classifier(classifier: C) -> Self {
        Self {
            template: classifier,
            state: None,
        }
    }

    /// Train a fresh model
    ///
    /// # Errors
    ///
    /// Same as [`train`](Self::train)
    pub fn fit(table: &Table, label_column: &str) -> Result<Self> {
        let mut model = Self::new();
        model.train(table, label_column)?;
        Ok(model)
    }

    /// Fit a new classifier on `table`, using every column except
    /// `label_column` as a feature, in table order.
    ///
    /// On failure the model keeps whatever state it had before the call.
    ///
    /// # Errors
    ///
    /// Returns `Training` if the table is empty, the label column is missing
    /// or null, there are no feature columns, or a feature column is not
    /// numeric/boolean, contains nulls or non-finite values
    pub fn train(&mut self, table: &Table, label_column: &str) -> Result<TrainingReport> {
        let started_at = Utc::now();

        if table.num_rows() == 0 {
            return Err(Error::Training("Cannot train on an empty table".to_string()));
        }
        if !table.contains_column(label_column) {
            return Err(Error::Training(format!(
                "Label column '{label_column}' not found in {:?}",
                table.column_names()
            )));
        }
        let feature_names: Vec<String> = table
            .column_names()
            .into_iter()
            .filter(|name| name != label_column)
            .collect();
        if feature_names.is_empty() {
            return Err(Error::Training(format!(
                "No feature columns besides '{label_column}'"
            )));
        }

        let x = FeatureMatrix::from_table(table, &feature_names).map_err(Error::Training)?;
        let labels = EncodedLabels::from_table(table, label_column).map_err(Error::Training)?;

        let mut classifier = self.template.clone();
        classifier.fit(&x, &labels.indices, labels.classes.len())?;
        let finished_at = Utc::now();

        let report = TrainingReport::new(
            x.n_rows(),
            x.n_cols(),
            labels.classes.len(),
            started_at,
            finished_at,
        );
        tracing::info!(
            model = C::NAME,
            rows = report.rows(),
            features = report.features(),
            classes = report.classes(),
            elapsed_ms = report.duration().num_milliseconds(),
            "model trained"
        );

        self.state = Some(FittedModel {
            name: C::NAME.to_string(),
            trained_at: finished_at,
            label_column: label_column.to_string(),
            feature_names,
            classes: labels.classes,
            classifier,
        });
        Ok(report)
    }

    /// Predict the label of a single-row table.
    ///
    /// Columns are matched by name, so their order does not matter, but the
    /// set of columns must equal the training feature set exactly.
    ///
    /// # Errors
    ///
    /// Returns `Prediction` if the model is not ready, the table does not have
    /// exactly one row, the column set differs, or a value is unusable
    pub fn predict(&self, row: &Table) -> Result<Prediction> {
        let fitted = self.ready().map_err(Error::Prediction)?;

        if row.num_rows() != 1 {
            return Err(Error::Prediction(format!(
                "Expected exactly one row, got {}",
                row.num_rows()
            )));
        }
        let columns = row.column_names();
        let same_schema = columns.len() == fitted.feature_names.len()
            && fitted.feature_names.iter().all(|name| columns.contains(name));
        if !same_schema {
            return Err(Error::Prediction(format!(
                "Feature schema mismatch: expected {:?}, got {columns:?}",
                fitted.feature_names
            )));
        }

        let x = FeatureMatrix::from_table(row, &fitted.feature_names).map_err(Error::Prediction)?;
        let proba = fitted.classifier.predict_proba(x.row(0))?;

        let mut best = 0;
        for (idx, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = idx;
            }
        }
        let label = fitted
            .classes
            .get(best)
            .cloned()
            .ok_or_else(|| Error::Prediction("Classifier returned no probabilities".to_string()))?;

        Ok(Prediction {
            label,
            confidence: proba[best].clamp(0.0, 1.0),
        })
    }

    /// Write the model to `path`, overwriting any existing artifact
    ///
    /// # Errors
    ///
    /// Returns `Artifact` if the model is not ready or the file cannot be
    /// written, and `Json` if the classifier cannot be encoded
    pub fn save(&self, path: impl AsRef<Path>) -> Result<ArtifactRecord> {
        let path = path.as_ref();
        let fitted = self.ready().map_err(Error::Artifact)?;
        let record = artifact::write(path, fitted)?;
        tracing::info!(
            path = %path.display(),
            size_bytes = record.size_bytes(),
            "model saved"
        );
        Ok(record)
    }

    /// Load a model from the artifact at `path`
    ///
    /// Later [`train`](Self::train) calls reuse the restored classifier's
    /// hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns `Artifact` if the file is missing, corrupt, or incompatible
    pub fn restore(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fitted: FittedModel<C> = artifact::read(path)?;
        fitted.check()?;
        tracing::info!(
            path = %path.display(),
            model = %fitted.name,
            trained_at = %fitted.trained_at,
            "model restored"
        );
        Ok(Self {
            template: fitted.classifier.clone(),
            state: Some(fitted),
        })
    }

    /// Replace this model with the artifact at `path`; keeps the current
    /// state on failure
    ///
    /// # Errors
    ///
    /// Same as [`restore`](Self::restore)
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        *self = Self::restore(path)?;
        Ok(())
    }

    /// `"Currently running {name}, from {YYYY-MM-DD HH:MM:SS}"`
    ///
    /// # Errors
    ///
    /// Returns `Prediction` if the model is not ready
    pub fn describe(&self) -> Result<String> {
        let fitted = self.ready().map_err(Error::Prediction)?;
        Ok(format!(
            "Currently running {}, from {}",
            fitted.name,
            fitted.trained_at.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Check whether the model has been trained or restored
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Get the display name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.name.as_str())
    }

    /// Get the training timestamp
    #[must_use]
    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.state.as_ref().map(|s| s.trained_at)
    }

    /// Get the label column the model was trained on
    #[must_use]
    pub fn label_column(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.label_column.as_str())
    }

    /// Get the expected feature columns, in training order
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|s| s.feature_names.as_slice())
            .unwrap_or_default()
    }

    /// Get the class labels, sorted
    #[must_use]
    pub fn classes(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|s| s.classes.as_slice())
            .unwrap_or_default()
    }

    /// Get the fitted classifier
    #[must_use]
    pub fn classifier(&self) -> Option<&C> {
        self.state.as_ref().map(|s| &s.classifier)
    }

    fn ready(&self) -> std::result::Result<&FittedModel<C>, String> {
        self.state
            .as_ref()
            .ok_or_else(|| "Model has not been trained or restored".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Record;
    use serde_json::json;

    /// Forest small enough for fast unit tests
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct SmallForest(RandomForest);

    impl Default for SmallForest {
        fn default() -> Self {
            Self(RandomForest::new(ForestParams {
                n_estimators: 8,
                seed: 42,
                ..ForestParams::default()
            }))
        }
    }

    impl Classifier for SmallForest {
        const NAME: &'static str = MODEL_NAME;

        fn fit(&mut self, x: &FeatureMatrix, y: &[usize], n_classes: usize) -> Result<()> {
            self.0.fit(x, y, n_classes)
        }

        fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
            self.0.predict_proba(row)
        }

        fn n_features(&self) -> usize {
            self.0.n_features()
        }

        fn n_classes(&self) -> usize {
            self.0.n_classes()
        }

        fn validate(&self) -> Result<()> {
            self.0.validate()
        }
    }

    type SmallModel = Predictor<SmallForest>;

    fn table(value: serde_json::Value) -> Table {
        let records: Vec<Record> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        Table::from_records(&records).unwrap()
    }

    fn training_table() -> Table {
        let mut rows = Vec::new();
        for i in 0..20 {
            let level = i % 5;
            rows.push(json!({"Level": level, "Health": 10.0 + f64::from(level), "Rarity": "Rank 0"}));
            rows.push(json!({"Level": 20 + level, "Health": 90.0 + f64::from(level), "Rarity": "Rank 3"}));
        }
        table(serde_json::Value::Array(rows))
    }

    fn temp_path(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("monster-lab-model-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("model.json")
    }

    #[test]
    fn test_new_model_is_uninitialized() {
        let model = Model::new();
        assert!(!model.is_ready());
        assert!(model.name().is_none());
        assert!(model.feature_names().is_empty());
        assert!(matches!(model.describe(), Err(Error::Prediction(_))));
    }

    #[test]
    fn test_train_then_predict() {
        let mut model = SmallModel::new();
        let report = model.train(&training_table(), DEFAULT_LABEL).unwrap();
        assert_eq!(report.rows(), 40);
        assert_eq!(report.features(), 2);
        assert_eq!(report.classes(), 2);
        assert_eq!(Some(report.finished_at()), model.trained_at());

        assert!(model.is_ready());
        assert_eq!(model.name(), Some(MODEL_NAME));
        assert_eq!(model.label_column(), Some(DEFAULT_LABEL));
        assert_eq!(model.feature_names(), ["Level", "Health"]);
        assert_eq!(model.classes(), ["Rank 0", "Rank 3"]);

        let prediction = model
            .predict(&table(json!([{"Level": 22, "Health": 91.0}])))
            .unwrap();
        assert_eq!(prediction.label, "Rank 3");
        assert!((0.0..=1.0).contains(&prediction.confidence));
    }

    #[test]
    fn test_predict_matches_columns_by_name() {
        let model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let ordered = model.predict(&table(json!([{"Level": 1, "Health": 11.0}]))).unwrap();
        let swapped = model.predict(&table(json!([{"Health": 11.0, "Level": 1}]))).unwrap();
        assert_eq!(ordered, swapped);
    }

    #[test]
    fn test_predict_schema_mismatch() {
        let model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let missing = model.predict(&table(json!([{"Level": 1}])));
        assert!(matches!(missing, Err(Error::Prediction(ref msg)) if msg.contains("schema")));

        let extra = model.predict(&table(json!([{"Level": 1, "Health": 1.0, "Rarity": "Rank 0"}])));
        assert!(matches!(extra, Err(Error::Prediction(_))));

        let text = model.predict(&table(json!([{"Level": "high", "Health": 1.0}])));
        assert!(matches!(text, Err(Error::Prediction(_))));
    }

    #[test]
    fn test_predict_requires_single_row() {
        let model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let two = table(json!([{"Level": 1, "Health": 1.0}, {"Level": 2, "Health": 2.0}]));
        assert!(matches!(model.predict(&two), Err(Error::Prediction(_))));
        assert!(matches!(model.predict(&Table::empty()), Err(Error::Prediction(_))));
    }

    #[test]
    fn test_predict_before_train() {
        let model = Model::new();
        let row = table(json!([{"Level": 1}]));
        assert!(matches!(model.predict(&row), Err(Error::Prediction(_))));
    }

    #[test]
    fn test_training_errors() {
        let mut model = SmallModel::new();
        assert!(matches!(model.train(&Table::empty(), "Rarity"), Err(Error::Training(_))));

        let no_label = table(json!([{"Level": 1}]));
        assert!(matches!(model.train(&no_label, "Rarity"), Err(Error::Training(_))));

        let only_label = table(json!([{"Rarity": "Rank 0"}]));
        assert!(matches!(model.train(&only_label, "Rarity"), Err(Error::Training(_))));

        let text_feature = table(json!([{"Name": "Imp", "Rarity": "Rank 0"}]));
        assert!(matches!(model.train(&text_feature, "Rarity"), Err(Error::Training(_))));

        assert!(!model.is_ready());
    }

    #[test]
    fn test_failed_train_keeps_prior_state() {
        let mut model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let before = model.describe().unwrap();
        assert!(model.train(&Table::empty(), DEFAULT_LABEL).is_err());
        assert!(model.is_ready());
        assert_eq!(model.describe().unwrap(), before);
    }

    #[test]
    fn test_describe_format() {
        let model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let text = model.describe().unwrap();
        let stamp = model.trained_at().unwrap().format(TIMESTAMP_FORMAT).to_string();
        assert_eq!(text, format!("Currently running Random Forest Classifier, from {stamp}"));
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let path = temp_path("roundtrip");
        let model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let record = model.save(&path).unwrap();
        assert!(record.size_bytes() > 0);

        let restored = SmallModel::restore(&path).unwrap();
        assert_eq!(restored.describe().unwrap(), model.describe().unwrap());
        assert_eq!(restored.feature_names(), model.feature_names());
        assert_eq!(restored.classes(), model.classes());

        let row = table(json!([{"Level": 3, "Health": 50.0}]));
        assert_eq!(restored.predict(&row).unwrap(), model.predict(&row).unwrap());
    }

    #[test]
    fn test_seeded_params_train_identical_forests() {
        let params = ForestParams {
            n_estimators: 6,
            seed: 2024,
            ..ForestParams::default()
        };
        let mut a = Model::with_params(params.clone());
        let mut b = Model::with_params(params);
        a.train(&training_table(), DEFAULT_LABEL).unwrap();
        b.train(&training_table(), DEFAULT_LABEL).unwrap();

        let forest = a.classifier().unwrap();
        assert_eq!(forest.trees().len(), 6);
        assert_eq!(forest.params().seed, 2024);
        assert_eq!(a.classifier(), b.classifier());
    }

    #[test]
    fn test_retrain_after_restore_keeps_hyperparameters() {
        let path = temp_path("retrain");
        let mut model = Model::with_params(ForestParams {
            n_estimators: 3,
            seed: 5,
            ..ForestParams::default()
        });
        model.train(&training_table(), DEFAULT_LABEL).unwrap();
        model.save(&path).unwrap();

        let mut restored = Model::restore(&path).unwrap();
        restored.train(&training_table(), DEFAULT_LABEL).unwrap();
        assert_eq!(restored.classifier(), model.classifier());
    }

    #[test]
    fn test_save_requires_ready() {
        let path = temp_path("unready");
        let result = Model::new().save(&path);
        assert!(matches!(result, Err(Error::Artifact(_))));
    }

    #[test]
    fn test_reload_keeps_state_on_failure() {
        let mut model = SmallModel::fit(&training_table(), DEFAULT_LABEL).unwrap();
        let before = model.describe().unwrap();
        let missing = temp_path("reload").with_file_name("absent.json");
        assert!(matches!(model.reload(&missing), Err(Error::Artifact(_))));
        assert_eq!(model.describe().unwrap(), before);
    }

    #[test]
    fn test_restore_rejects_mismatched_metadata() {
        let path = temp_path("tampered");
        SmallModel::fit(&training_table(), DEFAULT_LABEL)
            .unwrap()
            .save(&path)
            .unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["model"]["feature_names"] = json!(["Level"]);
        std::fs::write(&path, doc.to_string()).unwrap();

        assert!(matches!(SmallModel::restore(&path), Err(Error::Artifact(_))));
    }
}
