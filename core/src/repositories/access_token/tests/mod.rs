mod prune_tests;
