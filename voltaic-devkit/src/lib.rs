/*!
Voltaic Devkit - outils de développement sans cloud constructeur réel

Permet de développer et tester le kernel sans compte ni véhicule : stub HTTP
du cloud véhicule (liste, télémétrie, wake) avec transitions scriptées
asleep -> online, plus des builders de payloads télémétrie.
*/

pub mod builders;
pub mod cloud_stub;
pub mod test_utils;
