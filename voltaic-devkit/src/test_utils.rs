/*!
Petits utilitaires partagés par les tests d'intégration.
*/

/// Initialise env_logger une seule fois par process de test.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
