//! Transfer from an arbitrary primal estimator: fit the primal, use its
//! predicted response surface as the soft target, and fit a proxy on that.

use ndarray::{Array1, Array2};
use tracing::info;

use px_types::{AdapterError, IrtVariant, PxResult};

use crate::irt::{FitOptions, IrtRegressor};

/// A source model that can be fitted on user/question pairs and then score
/// them.
pub trait PrimalModel {
    fn fit(
        &mut self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) -> PxResult<()>;

    /// Predicted response probability per row.
    fn predict(&self, x_user: &Array2<f64>, x_questions: &Array2<f64>) -> PxResult<Array1<f64>>;
}

fn distill<P: PrimalModel>(
    declared: IrtVariant,
    options: &FitOptions,
    primal: &mut P,
    x_user: &Array2<f64>,
    x_questions: &Array2<f64>,
    y: &Array1<f64>,
) -> PxResult<IrtRegressor> {
    primal.fit(x_user, x_questions, y)?;
    let targets = primal.predict(x_user, x_questions)?;
    info!(
        variant = declared.label(),
        rows = targets.len(),
        "distilling primal predictions into a proxy"
    );

    let mut proxy = IrtRegressor::new(declared).with_options(options.clone());
    proxy.fit(x_user, x_questions, &targets)?;
    Ok(proxy)
}

/// Proxy over a primal classifier: predictions are thresholded at 0.5.
pub struct ProxyClassifier {
    declared: IrtVariant,
    options: FitOptions,
    proxy: Option<IrtRegressor>,
}

impl ProxyClassifier {
    pub fn new(declared: IrtVariant) -> Self {
        Self {
            declared,
            options: FitOptions::default(),
            proxy: None,
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fit<P: PrimalModel>(
        &mut self,
        primal: &mut P,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) -> PxResult<()> {
        self.proxy = Some(distill(
            self.declared,
            &self.options,
            primal,
            x_user,
            x_questions,
            y,
        )?);
        Ok(())
    }

    /// Hard class labels (0/1), one per row.
    pub fn predict(
        &self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
    ) -> PxResult<Array1<f64>> {
        let probabilities = self.proxy()?.predict(x_user, x_questions)?;
        Ok(probabilities.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// The fitted proxy estimator behind the classifier surface.
    pub fn proxy(&self) -> Result<&IrtRegressor, AdapterError> {
        self.proxy.as_ref().ok_or(AdapterError::NotFitted)
    }
}

/// Proxy over a primal regressor: predictions stay on the response scale.
pub struct ProxyRegressor {
    declared: IrtVariant,
    options: FitOptions,
    proxy: Option<IrtRegressor>,
}

impl ProxyRegressor {
    pub fn new(declared: IrtVariant) -> Self {
        Self {
            declared,
            options: FitOptions::default(),
            proxy: None,
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fit<P: PrimalModel>(
        &mut self,
        primal: &mut P,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) -> PxResult<()> {
        self.proxy = Some(distill(
            self.declared,
            &self.options,
            primal,
            x_user,
            x_questions,
            y,
        )?);
        Ok(())
    }

    pub fn predict(
        &self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
    ) -> PxResult<Array1<f64>> {
        self.proxy()?.predict(x_user, x_questions)
    }

    pub fn proxy(&self) -> Result<&IrtRegressor, AdapterError> {
        self.proxy.as_ref().ok_or(AdapterError::NotFitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_optimizer::Metric;
    use px_types::PxError;

    /// Memorizes the mean response per item column; a stand-in source model.
    struct ItemMeanPrimal {
        means: Option<Vec<f64>>,
    }

    impl ItemMeanPrimal {
        fn new() -> Self {
            Self { means: None }
        }
    }

    impl PrimalModel for ItemMeanPrimal {
        fn fit(
            &mut self,
            _x_user: &Array2<f64>,
            x_questions: &Array2<f64>,
            y: &Array1<f64>,
        ) -> PxResult<()> {
            let items = x_questions.ncols();
            let mut sums = vec![0.0; items];
            let mut counts = vec![0.0; items];
            for (row, &target) in x_questions.rows().into_iter().zip(y.iter()) {
                for (item, &flag) in row.iter().enumerate() {
                    if flag > 0.0 {
                        sums[item] += target;
                        counts[item] += 1.0;
                    }
                }
            }
            self.means = Some(
                sums.iter()
                    .zip(&counts)
                    .map(|(&s, &c)| if c > 0.0 { s / c } else { 0.5 })
                    .collect(),
            );
            Ok(())
        }

        fn predict(
            &self,
            _x_user: &Array2<f64>,
            x_questions: &Array2<f64>,
        ) -> PxResult<Array1<f64>> {
            let means = self
                .means
                .as_ref()
                .ok_or(AdapterError::NotFitted)
                .map_err(PxError::from)?;
            Ok(x_questions
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .zip(means)
                        .map(|(&flag, &mean)| flag * mean)
                        .sum()
                })
                .collect())
        }
    }

    fn toy_data() -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let mut rows_u = Vec::new();
        let mut rows_q = Vec::new();
        let mut targets = Vec::new();
        for user in 0..4usize {
            for item in 0..3usize {
                let mut u = vec![0.0; 4];
                u[user] = 1.0;
                let mut q = vec![0.0; 3];
                q[item] = 1.0;
                rows_u.push(u);
                rows_q.push(q);
                targets.push(if user >= item { 1.0 } else { 0.0 });
            }
        }
        (
            Array2::from_shape_vec((12, 4), rows_u.concat()).unwrap(),
            Array2::from_shape_vec((12, 3), rows_q.concat()).unwrap(),
            Array1::from(targets),
        )
    }

    fn quick_options() -> FitOptions {
        FitOptions {
            epochs: 30,
            batch_size: 4,
            validation_split: 0.0,
            num_trials: 1,
            metric: Metric::MeanError,
            ..FitOptions::default()
        }
    }

    #[test]
    fn classifier_fits_primal_then_proxy_and_thresholds() {
        let (x_u, x_q, y) = toy_data();
        let mut primal = ItemMeanPrimal::new();
        let mut classifier =
            ProxyClassifier::new(IrtVariant::Rasch).with_options(quick_options());

        classifier.fit(&mut primal, &x_u, &x_q, &y).unwrap();
        assert!(primal.means.is_some(), "primal was not fitted first");

        let labels = classifier.predict(&x_u, &x_q).unwrap();
        assert_eq!(labels.len(), 12);
        assert!(labels.iter().all(|&l| l == 0.0 || l == 1.0));
        assert_eq!(classifier.proxy().unwrap().variant().unwrap(), IrtVariant::Rasch);
    }

    #[test]
    fn regressor_predicts_on_the_response_scale() {
        let (x_u, x_q, y) = toy_data();
        let mut primal = ItemMeanPrimal::new();
        let mut regressor = ProxyRegressor::new(IrtVariant::Rasch).with_options(quick_options());

        regressor.fit(&mut primal, &x_u, &x_q, &y).unwrap();
        let predictions = regressor.predict(&x_u, &x_q).unwrap();
        assert_eq!(predictions.len(), 12);
        assert!(predictions.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn unfitted_proxies_are_rejected() {
        let (x_u, x_q, _) = toy_data();
        let classifier = ProxyClassifier::new(IrtVariant::Rasch);
        assert!(matches!(
            classifier.predict(&x_u, &x_q),
            Err(PxError::Adapter(AdapterError::NotFitted))
        ));
        let regressor = ProxyRegressor::new(IrtVariant::Rasch);
        assert!(matches!(
            regressor.proxy(),
            Err(AdapterError::NotFitted)
        ));
    }

    #[test]
    fn primal_errors_propagate() {
        struct FailingPrimal;
        impl PrimalModel for FailingPrimal {
            fn fit(
                &mut self,
                _x_user: &Array2<f64>,
                _x_questions: &Array2<f64>,
                _y: &Array1<f64>,
            ) -> PxResult<()> {
                Err(px_types::PxError::Internal("primal offline".to_string()))
            }

            fn predict(
                &self,
                _x_user: &Array2<f64>,
                _x_questions: &Array2<f64>,
            ) -> PxResult<Array1<f64>> {
                unreachable!("fit always fails")
            }
        }

        let (x_u, x_q, y) = toy_data();
        let mut regressor = ProxyRegressor::new(IrtVariant::Rasch);
        let err = regressor
            .fit(&mut FailingPrimal, &x_u, &x_q, &y)
            .unwrap_err();
        assert!(err.to_string().contains("primal offline"));
    }
}
